//! End-to-end tests driving the public server/client API over real TCP
//! loopback sockets, mirroring the teacher's `examples/echo_server.rs` /
//! `examples/client.rs` pairing but exercised as automated tests instead of
//! long-running binaries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use socket_flow::{
    client_open, server_open, ClientConfig, ConnectionHandle, DataType, Message, Registry,
    ServerConfig, WebSocketConfig, WebSocketHandler,
};

struct Echo {
    handle: ConnectionHandle,
}

#[async_trait]
impl WebSocketHandler for Echo {
    async fn on_message(&mut self, message: Message) {
        let _ = self.handle.send(message).await;
    }
}

#[derive(Clone, Default)]
struct Collector {
    messages: Arc<Mutex<Vec<Message>>>,
}

#[async_trait]
impl WebSocketHandler for Collector {
    async fn on_message(&mut self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }
}

async fn start_echo_server(config: ServerConfig) -> socket_flow::ServerHandle {
    server_open(config, |handle, _registry: Registry| Echo { handle })
        .await
        .expect("server failed to bind")
}

#[tokio::test]
async fn text_message_round_trips_over_real_tcp() {
    let server = start_echo_server(ServerConfig::new("127.0.0.1", 0)).await;
    let port = server.local_addr().port();

    let collector = Collector::default();
    let received = collector.messages.clone();
    let client = client_open(
        ClientConfig::new(format!("ws://127.0.0.1:{port}/")),
        move |_handle| collector,
    )
    .await
    .expect("client failed to connect");

    client.send_text("hello").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(received.lock().unwrap().as_slice(), &[Message::Text("hello".into())]);

    client.close(1000).await.unwrap();
    server.close().await;
}

#[tokio::test]
async fn fragmented_binary_message_is_reassembled() {
    let server = start_echo_server(ServerConfig::new("127.0.0.1", 0)).await;
    let port = server.local_addr().port();

    let collector = Collector::default();
    let received = collector.messages.clone();
    let client = client_open(
        ClientConfig::new(format!("ws://127.0.0.1:{port}/")),
        move |_handle| collector,
    )
    .await
    .expect("client failed to connect");

    client
        .send_fragment_start(DataType::Binary, vec![1, 2, 3])
        .await
        .unwrap();
    client.send_fragment_continuation(false, vec![4, 5]).await.unwrap();
    client.send_fragment_continuation(true, vec![6]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    // the echo server reassembles then echoes a single complete message back
    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[Message::Binary(vec![1, 2, 3, 4, 5, 6])]
    );

    client.close(1000).await.unwrap();
    server.close().await;
}

#[tokio::test]
async fn large_message_is_auto_fragmented_and_reassembled() {
    let server = start_echo_server(ServerConfig::new("127.0.0.1", 0)).await;
    let port = server.local_addr().port();

    let collector = Collector::default();
    let received = collector.messages.clone();

    // a tiny max_frame_size forces send_text to split the payload across
    // several continuation frames on the wire.
    let mut client_config = ClientConfig::new(format!("ws://127.0.0.1:{port}/"));
    client_config.web_socket_config = WebSocketConfig {
        max_frame_size: 8,
        ..WebSocketConfig::default()
    };

    let client = client_open(client_config, move |_handle| collector)
        .await
        .expect("client failed to connect");

    let payload = "a message considerably longer than eight bytes of frame size";
    client.send_text(payload).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[Message::Text(payload.into())]
    );

    client.close(1000).await.unwrap();
    server.close().await;
}

#[tokio::test]
async fn ping_does_not_disrupt_the_data_channel() {
    let server = start_echo_server(ServerConfig::new("127.0.0.1", 0)).await;
    let port = server.local_addr().port();

    let collector = Collector::default();
    let received = collector.messages.clone();
    let client = client_open(
        ClientConfig::new(format!("ws://127.0.0.1:{port}/")),
        move |_handle| collector,
    )
    .await
    .expect("client failed to connect");

    client.ping(vec![7, 7, 7]).await.unwrap();
    client.send_text("still alive").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[Message::Text("still alive".into())]
    );

    client.close(1000).await.unwrap();
    server.close().await;
}

#[tokio::test]
async fn broadcast_reaches_every_other_connection() {
    struct Relay {
        handle: ConnectionHandle,
        registry: Registry,
    }

    #[async_trait]
    impl WebSocketHandler for Relay {
        async fn on_message(&mut self, message: Message) {
            for peer in self.registry.handles().await {
                if peer.id() != self.handle.id() {
                    let _ = peer.send(message.clone()).await;
                }
            }
        }
    }

    let server = server_open(ServerConfig::new("127.0.0.1", 0), |handle, registry| Relay {
        handle,
        registry,
    })
    .await
    .expect("server failed to bind");
    let port = server.local_addr().port();

    let alice_inbox = Collector::default();
    let alice_received = alice_inbox.messages.clone();
    let alice = client_open(
        ClientConfig::new(format!("ws://127.0.0.1:{port}/")),
        move |_handle| alice_inbox,
    )
    .await
    .unwrap();

    let bob_inbox = Collector::default();
    let bob_received = bob_inbox.messages.clone();
    let bob = client_open(
        ClientConfig::new(format!("ws://127.0.0.1:{port}/")),
        move |_handle| bob_inbox,
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    bob.send_text("hi alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        alice_received.lock().unwrap().as_slice(),
        &[Message::Text("hi alice".into())]
    );
    assert!(bob_received.lock().unwrap().is_empty());

    alice.close(1000).await.unwrap();
    bob.close(1000).await.unwrap();
    server.close().await;
}
