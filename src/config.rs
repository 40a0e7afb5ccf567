//! Ambient configuration knobs. TLS and `permessage-deflate` are
//! deliberately absent — both are explicit Non-goals (spec §1): a caller
//! wanting TLS wraps their own stream before handing it to
//! `Connection::accept`/`Connection::connect`, since both are generic over
//! any `AsyncRead + AsyncWrite` transport.

/// Frame/message size ceilings enforced by the connection state machine.
/// Defaults follow the teacher crate's `WebSocketConfig`.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: 16 << 20,
            max_message_size: 64 << 20,
        }
    }
}

/// `server_open` config, per spec §6.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub web_socket_config: WebSocketConfig,
}

impl ServerConfig {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            web_socket_config: WebSocketConfig::default(),
        }
    }
}

/// `client_open` config, per spec §6. `endpoint` is a full `ws://`/`wss://`
/// URL; host/port are derived from it during `connect` (see `request.rs`).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub web_socket_config: WebSocketConfig,
    /// Wall-clock budget for the handshake, per spec §3/§4.2. Defaults to
    /// the spec's 30 seconds.
    pub handshake_timeout: std::time::Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            web_socket_config: WebSocketConfig::default(),
            handshake_timeout: std::time::Duration::from_secs(30),
        }
    }
}
