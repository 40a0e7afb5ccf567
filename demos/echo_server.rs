use async_trait::async_trait;
use log::*;
use socket_flow::{start_server, ConnectionHandle, Message, Registry, WebSocketHandler};

struct Echo {
    handle: ConnectionHandle,
}

#[async_trait]
impl WebSocketHandler for Echo {
    async fn on_open(&mut self) {
        info!("connection {} opened", self.handle.id());
    }

    async fn on_message(&mut self, message: Message) {
        if let Err(err) = self.handle.send(message).await {
            error!("failed to echo message back: {err}");
        }
    }

    async fn on_close(&mut self) {
        info!("connection {} closed", self.handle.id());
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let port = 9002;
    let server = start_server(port, |handle, _registry: Registry| Echo { handle })
        .await
        .expect("failed to bind server");
    info!("echoing on: {}", server.local_addr());

    // keep the process alive; Ctrl-C to stop.
    std::future::pending::<()>().await;
}
