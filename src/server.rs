//! A ready-to-use WebSocket server (spec §6). `server_open` binds a
//! listener and spawns one task per accepted connection; each connection
//! gets its own handler instance (built from `make_handler`) and is
//! tracked in a [`Registry`] for the lifetime of the endpoint. Grounded in
//! the teacher's `server.rs::start_server_with_config`, generalized from a
//! single flat event channel to the handler-trait/registry design (spec
//! REDESIGN FLAGS).

use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{ServerConfig, WebSocketConfig};
use crate::connection::Connection;
use crate::error::Error;
use crate::handler::WebSocketHandler;
use crate::registry::{ConnectionHandle, Registry};

const COMMAND_QUEUE_DEPTH: usize = 256;

/// A running server endpoint. Dropping this does not stop the server —
/// call [`ServerHandle::close`] to shut the acceptor down and close every
/// open connection.
pub struct ServerHandle {
    local_addr: std::net::SocketAddr,
    registry: Registry,
    acceptor: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Stops accepting new connections and asks every currently open
    /// connection to close with 1001 (Going Away). Existing connections
    /// finish their own close handshake independently; this does not block
    /// on them.
    pub async fn close(self) {
        self.acceptor.abort();
        for handle in self.registry.handles().await {
            let _ = handle.close(crate::connection::CLOSE_GOING_AWAY).await;
        }
    }
}

/// Binds `config.address:config.port` and spawns the accept loop. For each
/// accepted TCP connection, performs the server-side opening handshake and,
/// on success, spawns a task running `Connection::run` with a fresh handler
/// built by `make_handler`.
///
/// `make_handler` receives the [`ConnectionHandle`] for the connection being
/// set up plus the endpoint's shared [`Registry`], so a handler can address
/// its own connection (e.g. to reply) or every other open connection (e.g.
/// to broadcast) without any bookkeeping of its own.
pub async fn server_open<F, H>(config: ServerConfig, make_handler: F) -> Result<ServerHandle, Error>
where
    F: Fn(ConnectionHandle, Registry) -> H + Send + Sync + 'static,
    H: WebSocketHandler,
{
    let listener = TcpListener::bind((config.address.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;
    let registry = Registry::new();
    let web_socket_config = config.web_socket_config;
    let make_handler = Arc::new(make_handler);

    let registry_for_task = registry.clone();
    let acceptor = tokio::spawn(async move {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!("accept failed: {err}");
                    continue;
                }
            };

            let id = Uuid::new_v4();
            let registry = registry_for_task.clone();
            let make_handler = make_handler.clone();

            tokio::spawn(async move {
                let connection = match Connection::accept(stream, web_socket_config).await {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!("handshake with {peer_addr} failed: {err}");
                        return;
                    }
                };

                let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
                let handle = ConnectionHandle::new(id, tx);
                registry.insert(handle.clone()).await;

                let handler = make_handler(handle, registry.clone());
                info!("accepted connection {id} from {peer_addr}");
                if let Err(err) = connection.run(handler, rx).await {
                    error!("connection {id} ended with an error: {err}");
                }

                registry.remove(id).await;
            });
        }
    });

    Ok(ServerHandle {
        local_addr,
        registry,
        acceptor,
    })
}

/// Convenience wrapper over [`server_open`] for defaults: binds
/// `0.0.0.0:port` with the default [`WebSocketConfig`].
pub async fn start_server<F, H>(port: u16, make_handler: F) -> Result<ServerHandle, Error>
where
    F: Fn(ConnectionHandle, Registry) -> H + Send + Sync + 'static,
    H: WebSocketHandler,
{
    let mut config = ServerConfig::new("0.0.0.0", port);
    config.web_socket_config = WebSocketConfig::default();
    server_open(config, make_handler).await
}
