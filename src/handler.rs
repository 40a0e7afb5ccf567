//! The callback API a caller implements to react to connection lifecycle
//! events (spec §6). Replaces the teacher's/original's C-style function
//! pointer + `void*` dispatch with a plain trait: `Connection::run` is
//! generic over `H: WebSocketHandler`, so each endpoint gets its own
//! monomorphized dispatch instead of one indirect call through a vtable.
//!
//! `#[async_trait]` is used rather than the newer inline `async fn in trait`
//! syntax so a boxed future is produced — a requirement for calling these
//! methods from inside `Connection::run`'s `tokio::select!` loop, which is
//! itself later handed to `tokio::spawn` by the server/client registries.

use async_trait::async_trait;

use crate::message::Message;

/// Per-connection event callbacks. One instance is constructed per accepted
/// or opened connection; it does not need to be `Clone` since each
/// connection gets its own.
#[async_trait]
pub trait WebSocketHandler: Send + 'static {
    /// Called once, after the opening handshake has completed and before
    /// any frames are read. Spec §6: "the client's `on_open` fires strictly
    /// after handshake success."
    async fn on_open(&mut self) {}

    /// Called once per complete, reassembled application message.
    async fn on_message(&mut self, message: Message);

    /// Called once, after the close handshake (or an abrupt transport
    /// close) has finished and the connection is being torn down.
    async fn on_close(&mut self) {}
}
