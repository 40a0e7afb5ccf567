//! The opening handshake (spec §4.2). Read as a synchronous prefix to the
//! connection's life: `server_handshake`/`client_handshake` perform their
//! own reads directly against the transport before the connection state
//! machine ever takes ownership of it for frame-level pumping — the
//! teacher's crate draws the same line between `handshake.rs` and the frame
//! loop in `connection.rs`/`read.rs`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};

use crate::error::Error;

const MAGIC_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key:";
const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept:";
const HEADER_TERMINATOR: &str = "\r\n\r\n";
const MAX_HEADER_BYTES: usize = 16 * 1024;
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// `Base64(SHA1(key || "258EAFA5-E914-47DA-95CA-C5AB0DC85B11"))`, per spec
/// §4.2/§8 scenario 6.
pub fn accept_token(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(MAGIC_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// 16 random bytes, base64-encoded, for `Sec-WebSocket-Key`. Uses `rand`'s
/// default CSPRNG-backed `thread_rng`, not a non-cryptographic PRNG (spec
/// §9 design note).
pub fn generate_client_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Reads from `stream` until the header terminator is seen or
/// `MAX_HEADER_BYTES`/`HEADER_READ_TIMEOUT` is exceeded. A single `read`
/// call can return bytes past the `\r\n\r\n` terminator (a peer that
/// pipelines its first frame right behind the handshake) — those belong to
/// the first frame, not the header, so they're split off and returned
/// separately rather than examined or discarded here.
async fn read_header<S: AsyncReadExt + Unpin>(stream: &mut S) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];

    timeout(HEADER_READ_TIMEOUT, async {
        loop {
            if buf.len() > MAX_HEADER_BYTES {
                return Err(Error::MalformedRequestLine);
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::MalformedRequestLine);
            }
            buf.extend_from_slice(&chunk[..n]);
            if contains_subslice(&buf, HEADER_TERMINATOR.as_bytes()) {
                return Ok(());
            }
        }
    })
    .await
    .map_err(|_| Error::HandshakeTimeout)??;

    let terminator_end = find_subslice(&buf, HEADER_TERMINATOR.as_bytes())
        .expect("loop above only returns once the terminator is present")
        + HEADER_TERMINATOR.len();
    let leftover = buf.split_off(terminator_end);
    Ok((buf, leftover))
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    find_subslice(haystack, needle).is_some()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Extracts a header's value from an HTTP header block. Matching is
/// case-sensitive on the header name, per spec §4.2 ("as emitted by
/// well-formed clients") — this is a compact handshake parser, not a
/// general-purpose HTTP parser.
fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    for line in headers.lines() {
        if let Some(rest) = line.strip_prefix(name) {
            return Some(rest.trim());
        }
    }
    None
}

/// Server side of the handshake: reads the client's Upgrade request,
/// extracts `Sec-WebSocket-Key`, and replies with the 101 response. Returns
/// any bytes read past the `\r\n\r\n` terminator — per spec §4.2, those
/// belong to the first frame and must be handed to the connection's
/// accumulator rather than dropped.
pub async fn server_handshake<S>(stream: &mut S) -> Result<Vec<u8>, Error>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let (raw, leftover) = read_header(stream).await?;
    let text = String::from_utf8_lossy(&raw);
    let (request_line, rest) = text.split_once("\r\n").ok_or(Error::MalformedRequestLine)?;
    if !request_line.starts_with("GET ") {
        return Err(Error::MalformedRequestLine);
    }

    let key = header_value(rest, SEC_WEBSOCKET_KEY).ok_or(Error::MissingSecWebSocketKey)?;
    if key.len() != 24 {
        return Err(Error::InvalidSecWebSocketKey);
    }

    let accept = accept_token(key);
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(leftover)
}

/// Client side of the handshake: sends the Upgrade request with a freshly
/// generated key and verifies the server's `Sec-WebSocket-Accept` against
/// the expected value. Returns any bytes read past the response's
/// `\r\n\r\n` terminator, for the same reason as [`server_handshake`].
pub async fn client_handshake<S>(stream: &mut S, path: &str, host_header: &str) -> Result<Vec<u8>, Error>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let key = generate_client_key();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let (raw, leftover) = read_header(stream).await?;
    let text = String::from_utf8_lossy(&raw);
    let (status_line, rest) = text.split_once("\r\n").ok_or(Error::MalformedRequestLine)?;
    if !status_line.contains("101") {
        return Err(Error::NotUpgraded);
    }

    let accept = header_value(rest, SEC_WEBSOCKET_ACCEPT).ok_or(Error::MissingAcceptHeader)?;
    if accept != accept_token(&key) {
        return Err(Error::AcceptMismatch);
    }

    Ok(leftover)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_token_matches_rfc6455_example() {
        // spec §8 scenario 6 / RFC 6455 §1.3's worked example.
        assert_eq!(
            accept_token("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[tokio::test]
    async fn handshake_round_trips_over_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let leftover = server_handshake(&mut server).await.unwrap();
            assert!(leftover.is_empty());
            server
        });

        let leftover = client_handshake(&mut client, "/chat", "localhost:8080")
            .await
            .unwrap();
        assert!(leftover.is_empty());

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn server_handshake_preserves_bytes_pipelined_after_the_request() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let leftover = server_handshake(&mut server).await.unwrap();
            leftover
        });

        // a single write carrying the Upgrade request immediately followed
        // by the first frame's bytes, as a pipelining client might send.
        let mut sent = format!(
            "GET /chat HTTP/1.1\r\n\
             Host: localhost\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        )
        .into_bytes();
        let frame_bytes = [0x81u8, 0x02, b'h', b'i'];
        sent.extend_from_slice(&frame_bytes);
        client.write_all(&sent).await.unwrap();

        let mut response = [0u8; 256];
        let n = client.read(&mut response).await.unwrap();
        assert!(String::from_utf8_lossy(&response[..n]).contains("101"));

        let leftover = server_task.await.unwrap();
        assert_eq!(leftover, frame_bytes);
    }

    #[tokio::test]
    async fn server_rejects_missing_key() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _ = client
                .write_all(b"GET /chat HTTP/1.1\r\nHost: x\r\n\r\n")
                .await;
        });
        let err = server_handshake(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::MissingSecWebSocketKey));
    }
}
