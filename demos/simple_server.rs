use async_trait::async_trait;
use log::*;
use socket_flow::{server_open, ConnectionHandle, Message, Registry, ServerConfig, WebSocketHandler};

/// Broadcasts every message it receives to every other connected client,
/// using the endpoint registry instead of a hand-rolled client map.
struct Broadcaster {
    handle: ConnectionHandle,
    registry: Registry,
}

#[async_trait]
impl WebSocketHandler for Broadcaster {
    async fn on_open(&mut self) {
        info!("client {} joined ({} total)", self.handle.id(), self.registry.len().await);
    }

    async fn on_message(&mut self, message: Message) {
        for peer in self.registry.handles().await {
            if peer.id() == self.handle.id() {
                continue;
            }
            if let Err(err) = peer.send(message.clone()).await {
                warn!("failed to forward message to {}: {err}", peer.id());
            }
        }
    }

    async fn on_close(&mut self) {
        info!("client {} left", self.handle.id());
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ServerConfig::new("127.0.0.1", 8080);

    let server = server_open(config, |handle, registry| Broadcaster { handle, registry })
        .await
        .expect("failed to bind server");

    info!("broadcasting on {}", server.local_addr());
    std::future::pending::<()>().await;
}
