use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use socket_flow::{connect, ConnectionHandle, DataType, Message, WebSocketHandler};
use tokio::time::{interval, Duration};

struct Chatter {
    handle: ConnectionHandle,
    received: usize,
}

#[async_trait]
impl WebSocketHandler for Chatter {
    async fn on_message(&mut self, message: Message) {
        if message.data_type() == DataType::Text {
            println!("received: {}", String::from_utf8_lossy(message.as_bytes()));
        }
        self.received += 1;
        if self.received >= 3 {
            if self.handle.close(1000).await.is_err() {
                eprintln!("error occurred when closing connection");
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let handle = connect("ws://127.0.0.1:9002", |handle| Chatter { handle, received: 0 })
        .await
        .expect("failed to connect");

    let mut ticker = interval(Duration::from_secs(5));
    while handle.is_connected() {
        ticker.tick().await;
        let text = generate_random_string();
        if handle.send_text(text).await.is_err() {
            eprintln!("failed to send message");
            break;
        }
    }
}

fn generate_random_string() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
