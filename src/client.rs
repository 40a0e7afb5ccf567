//! A ready-to-use WebSocket client (spec §6). `client_open` resolves a
//! `ws://` URL, dials it, and runs the connection in a background task,
//! handing the caller a [`ClientHandle`] to send/close with. TLS is a
//! Non-goal: `wss://` endpoints go through [`connect_with_stream`] instead,
//! which accepts any already-TLS-wrapped transport. Grounded in the
//! teacher's client-side connect helpers plus `request.rs` for endpoint
//! parsing.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::{ClientConfig, WebSocketConfig};
use crate::connection::Connection;
use crate::error::Error;
use crate::handler::WebSocketHandler;
use crate::registry::ConnectionHandle;
use crate::request::{self, ParsedEndpoint};

const COMMAND_QUEUE_DEPTH: usize = 256;

/// A running client connection. Sending/closing goes through the inner
/// [`ConnectionHandle`]; the background task driving the connection's read
/// loop is joined by [`ClientHandle::wait`] or simply dropped (the
/// connection keeps running either way, since the task owns the socket).
pub struct ClientHandle {
    handle: ConnectionHandle,
    task: JoinHandle<()>,
}

impl std::ops::Deref for ClientHandle {
    type Target = ConnectionHandle;

    fn deref(&self) -> &ConnectionHandle {
        &self.handle
    }
}

impl ClientHandle {
    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    /// `true` until the connection's background task has finished, i.e.
    /// until the close handshake (or an abrupt transport error) has run to
    /// completion.
    pub fn is_connected(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Resolves `config.endpoint`, dials it over plain TCP, and runs the
/// client-side handshake. Returns [`Error::TlsNotSupported`] for `wss://`
/// endpoints — use [`connect_with_stream`] with your own TLS-wrapped stream
/// instead.
pub async fn client_open<F, H>(config: ClientConfig, make_handler: F) -> Result<ClientHandle, Error>
where
    F: FnOnce(ConnectionHandle) -> H + Send + 'static,
    H: WebSocketHandler,
{
    let endpoint = request::parse_endpoint(&config.endpoint)?;
    if endpoint.use_tls {
        return Err(Error::TlsNotSupported);
    }

    let stream = timeout(
        config.handshake_timeout,
        TcpStream::connect(&endpoint.host_with_port),
    )
    .await
    .map_err(|_| Error::HandshakeTimeout)??;

    connect_with_stream(
        stream,
        &endpoint,
        config.web_socket_config,
        config.handshake_timeout,
        make_handler,
    )
    .await
}

/// Runs the client-side handshake and connection loop over an
/// already-established transport — the escape hatch for `wss://` and any
/// other transport this crate doesn't dial itself.
pub async fn connect_with_stream<S, F, H>(
    stream: S,
    endpoint: &ParsedEndpoint,
    ws_config: WebSocketConfig,
    handshake_timeout: Duration,
    make_handler: F,
) -> Result<ClientHandle, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(ConnectionHandle) -> H + Send + 'static,
    H: WebSocketHandler,
{
    let host_header = host_header_value(endpoint);
    let connection = timeout(
        handshake_timeout,
        Connection::connect(stream, &endpoint.path, &host_header, ws_config),
    )
    .await
    .map_err(|_| Error::HandshakeTimeout)??;

    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let id = Uuid::new_v4();
    let handle = ConnectionHandle::new(id, tx);
    let handler = make_handler(handle.clone());

    let task = tokio::spawn(async move {
        if let Err(err) = connection.run(handler, rx).await {
            log::error!("client connection {id} ended with an error: {err}");
        }
    });

    Ok(ClientHandle { handle, task })
}

/// Per RFC 6455 §4.1, `Host:` omits the port when it's the scheme's
/// default.
fn host_header_value(endpoint: &ParsedEndpoint) -> String {
    let default_port = if endpoint.use_tls { 443 } else { 80 };
    if endpoint.port == default_port {
        endpoint.host.clone()
    } else {
        endpoint.host_with_port.clone()
    }
}

/// Convenience wrapper over [`client_open`] for defaults.
pub async fn connect<F, H>(endpoint: impl Into<String>, make_handler: F) -> Result<ClientHandle, Error>
where
    F: FnOnce(ConnectionHandle) -> H + Send + 'static,
    H: WebSocketHandler,
{
    client_open(ClientConfig::new(endpoint), make_handler).await
}
