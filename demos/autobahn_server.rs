//! An echo server meant to be pointed at by the Autobahn Testsuite's fuzzing
//! client (`wstest -m fuzzingclient`) to exercise protocol-conformance edge
//! cases: fragmentation, invalid UTF-8, oversized frames, reserved close
//! codes, and so on. `permessage-deflate` cases will fail here since
//! compression is a Non-goal this crate never implements.

use async_trait::async_trait;
use log::*;
use socket_flow::{start_server, ConnectionHandle, Message, Registry, WebSocketHandler};

struct Echo {
    handle: ConnectionHandle,
}

#[async_trait]
impl WebSocketHandler for Echo {
    async fn on_message(&mut self, message: Message) {
        if let Err(err) = self.handle.send(message).await {
            error!("failed to echo message back: {err}");
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let port = 9001;
    let server = start_server(port, |handle, _registry: Registry| Echo { handle })
        .await
        .expect("failed to bind server");
    info!("autobahn echo target listening on {}", server.local_addr());

    std::future::pending::<()>().await;
}
