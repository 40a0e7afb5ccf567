//! The connection state machine (spec §3/§4): owns a transport, drives the
//! frame-level read loop, assembles fragmented messages, and answers
//! control frames. Grounded in the teacher's `connection.rs`/`read.rs` for
//! shape (a `BufReader` over the read half, a plain `WriteHalf` for writes)
//! and in `original_source/src/websocket.c`'s `handleFirstMessage` /
//! `handlePongMessage` / `handleDisconnectMessage` for the protocol
//! decisions themselves.

use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace, warn};
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::frame::{apply_mask, build_header, parse_header, OpCode, ParseOutcome, MAX_PAYLOAD_SIZE};
use crate::handler::WebSocketHandler;
use crate::handshake;
use crate::message::{DataType, Message, OutboundCommand, PartialMessage};

/// How long the read loop tolerates sitting on an incomplete frame or an
/// unfinished fragmented message before giving up on it. The original C
/// implementation stamps a deadline the first time a read comes back
/// wanting more bytes and discards the in-flight message once that deadline
/// elapses — not, as its `tv_sec == (tv_nsec == 0)` condition reads
/// literally, on every odd/even second boundary. This carries the intended
/// "stamp once, measure elapsed since" behavior. Per spec §4.3, timing out
/// drops the partial message and drains the buffer; it does not close the
/// connection.
const FRAGMENT_ASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;

/// Which side of the handshake this connection played, which in turn
/// decides masking direction (spec §4.4): a server never masks outbound
/// frames and requires every inbound frame to be masked; a client is the
/// mirror image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    /// We've sent our own Close frame and are waiting for the peer's echo.
    CloseSent,
    /// Either side has seen both Close frames; the socket is being torn
    /// down.
    Closed,
}

pub struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    role: Role,
    config: WebSocketConfig,
    read_buf: BytesMut,
    partial: Option<PartialMessage>,
    waiting_since: Option<Instant>,
    state: ConnState,
}

impl<S> Connection<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    /// Server side: performs the opening handshake over `stream`, then
    /// returns a connection ready to be driven by [`Connection::run`].
    pub async fn accept(mut stream: S, config: WebSocketConfig) -> Result<Self, Error> {
        let leftover = handshake::server_handshake(&mut stream).await?;
        Ok(Self::new(stream, Role::Server, config, leftover))
    }

    /// Client side: performs the opening handshake against `path`/
    /// `host_header` over `stream`, then returns a connection ready to be
    /// driven by [`Connection::run`].
    pub async fn connect(
        mut stream: S,
        path: &str,
        host_header: &str,
        config: WebSocketConfig,
    ) -> Result<Self, Error> {
        let leftover = handshake::client_handshake(&mut stream, path, host_header).await?;
        Ok(Self::new(stream, Role::Client, config, leftover))
    }

    /// `leftover` carries any bytes the handshake read past the header
    /// terminator — a peer that pipelines its first frame right behind the
    /// handshake bytes in the same TCP segment (spec §4.2: "remaining bytes
    /// belong to the first frame"). They seed `read_buf` so `pump_frames`
    /// sees them on the very first call instead of them being silently lost.
    fn new(stream: S, role: Role, config: WebSocketConfig, leftover: Vec<u8>) -> Self
    where
        S: AsyncReadExt + AsyncWriteExt + Unpin,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut read_buf = BytesMut::with_capacity(8 * 1024);
        read_buf.extend_from_slice(&leftover);
        Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
            role,
            config,
            read_buf,
            partial: None,
            waiting_since: None,
            state: ConnState::Open,
        }
    }

    /// Drives the connection until it closes: reads frames off the wire and
    /// dispatches them to `handler`, while also servicing outbound commands
    /// sent through `commands` (spec §5 — close is cooperative, observed by
    /// this loop rather than forced on the socket from outside).
    pub async fn run<H: WebSocketHandler>(
        mut self,
        mut handler: H,
        mut commands: mpsc::Receiver<OutboundCommand>,
    ) -> Result<(), Error> {
        handler.on_open().await;

        // The handshake may have left a complete frame (or more) already
        // sitting in `read_buf` from a peer that pipelined its first frame
        // behind the Upgrade exchange; drain that before waiting on a fresh
        // socket read; otherwise the frame sits unprocessed until more bytes
        // happen to arrive.
        if self.pump_frames(&mut handler).await? {
            handler.on_close().await;
            return Ok(());
        }

        let mut read_chunk = [0u8; 8 * 1024];
        loop {
            if self.state == ConnState::Closed {
                break;
            }

            let deadline = self
                .waiting_since
                .map(|since| since + FRAGMENT_ASSEMBLY_TIMEOUT);

            tokio::select! {
                biased;

                _ = async { tokio::time::sleep_until(deadline.unwrap()).await }, if deadline.is_some() => {
                    self.discard_stale_partial();
                }

                cmd = commands.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await? {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                read_result = self.reader.read(&mut read_chunk) => {
                    let n = read_result?;
                    if n == 0 {
                        debug!("peer closed the transport without a close handshake");
                        break;
                    }
                    self.read_buf.extend_from_slice(&read_chunk[..n]);
                    if self.pump_frames(&mut handler).await? {
                        break;
                    }
                }
            }
        }

        handler.on_close().await;
        Ok(())
    }

    /// Processes every complete frame currently buffered. Returns `Ok(true)`
    /// once the connection has fully closed.
    async fn pump_frames<H: WebSocketHandler>(&mut self, handler: &mut H) -> Result<bool, Error> {
        loop {
            let header = match parse_header(&self.read_buf) {
                ParseOutcome::Complete(header) => header,
                ParseOutcome::NeedMore => {
                    self.waiting_since.get_or_insert_with(Instant::now);
                    return Ok(false);
                }
                ParseOutcome::Malformed => {
                    self.fail_fast(CLOSE_PROTOCOL_ERROR).await?;
                    return Ok(true);
                }
            };

            if header.payload_len > MAX_PAYLOAD_SIZE || header.payload_len as usize > self.config.max_frame_size {
                warn!(
                    "peer advertised a {}-byte payload, over the {}-byte frame ceiling; closing before buffering it",
                    header.payload_len, self.config.max_frame_size
                );
                self.fail_fast(CLOSE_MESSAGE_TOO_BIG).await?;
                return Ok(true);
            }

            let total_len = header.header_len + header.payload_len as usize;
            if self.read_buf.len() < total_len {
                self.waiting_since.get_or_insert_with(Instant::now);
                return Ok(false);
            }
            self.waiting_since = None;

            let frame = self.read_buf.split_to(total_len);
            let mut payload = frame[header.header_len..].to_vec();

            let expects_masked = self.role == Role::Server;
            if header.masked != expects_masked {
                warn!("peer used the wrong masking direction for this role");
                self.fail_fast(CLOSE_PROTOCOL_ERROR).await?;
                return Ok(true);
            }
            if let Some(mask) = header.mask {
                apply_mask(&mut payload, mask);
            }

            if self.partial.is_some() && header.opcode.is_data() {
                warn!("received a new data frame while a fragmented message was in progress");
                self.fail_fast(CLOSE_PROTOCOL_ERROR).await?;
                return Ok(true);
            }
            if self.partial.is_none() && header.opcode == OpCode::Continuation {
                warn!("received a continuation frame with no message in progress");
                self.fail_fast(CLOSE_PROTOCOL_ERROR).await?;
                return Ok(true);
            }

            match header.opcode {
                OpCode::Text | OpCode::Binary => {
                    let mut partial = PartialMessage::new(header.opcode);
                    if let Err(code) = self.append_fragment(&mut partial, payload) {
                        self.fail_fast(code).await?;
                        return Ok(true);
                    }
                    if header.fin {
                        self.deliver(partial, handler).await?;
                    } else {
                        self.partial = Some(partial);
                    }
                }
                OpCode::Continuation => {
                    let mut partial = self.partial.take().expect("checked above");
                    if let Err(code) = self.append_fragment(&mut partial, payload) {
                        self.fail_fast(code).await?;
                        return Ok(true);
                    }
                    if header.fin {
                        self.deliver(partial, handler).await?;
                    } else {
                        self.partial = Some(partial);
                    }
                }
                OpCode::Ping => {
                    trace!("received ping, {} byte payload", payload.len());
                    self.write_frame(OpCode::Pong, true, &payload).await?;
                }
                OpCode::Pong => {
                    trace!("received unsolicited pong, ignoring");
                }
                OpCode::Close => {
                    if self.handle_close_frame(&payload).await? {
                        return Ok(true);
                    }
                }
            }
        }
    }

    /// Appends `payload` to `partial`, incrementally UTF-8-validating Text
    /// payloads. On failure, returns the close code that should be sent:
    /// 1009 for exceeding the configured message size, 1007 for invalid
    /// UTF-8.
    fn append_fragment(&self, partial: &mut PartialMessage, payload: Vec<u8>) -> Result<(), u16> {
        if partial.payload.len() + payload.len() > self.config.max_message_size {
            return Err(CLOSE_MESSAGE_TOO_BIG);
        }
        if let Some(validator) = partial.utf8.as_mut() {
            if validator.validate(&payload) == crate::utf8::State::Fail {
                return Err(CLOSE_INVALID_PAYLOAD);
            }
        }
        partial.payload.extend_from_slice(&payload);
        Ok(())
    }

    async fn deliver<H: WebSocketHandler>(
        &mut self,
        partial: PartialMessage,
        handler: &mut H,
    ) -> Result<(), Error> {
        if let Some(validator) = &partial.utf8 {
            if validator.state() != crate::utf8::State::Ok {
                self.fail_fast(CLOSE_INVALID_PAYLOAD).await?;
                return Ok(());
            }
        }
        handler.on_message(partial.into_message()).await;
        Ok(())
    }

    /// Handles an inbound Close frame per spec §4.3/§9 (grounded in
    /// `handleDisconnectMessage`). Returns `Ok(true)` once the connection
    /// should be torn down.
    async fn handle_close_frame(&mut self, payload: &[u8]) -> Result<bool, Error> {
        if payload.len() == 1 {
            self.fail_fast(CLOSE_PROTOCOL_ERROR).await?;
            return Ok(true);
        }

        let peer_initiated = self.state != ConnState::CloseSent;

        if payload.is_empty() {
            if peer_initiated {
                self.write_frame(OpCode::Close, true, &CLOSE_NORMAL.to_be_bytes()).await?;
            }
            self.state = ConnState::Closed;
            return Ok(true);
        }

        let mut code_bytes = [0u8; 2];
        code_bytes.copy_from_slice(&payload[..2]);
        let code = u16::from_be_bytes(code_bytes);

        if !is_valid_close_code(code) {
            if peer_initiated {
                self.write_frame(OpCode::Close, true, &CLOSE_PROTOCOL_ERROR.to_be_bytes())
                    .await?;
            }
            self.state = ConnState::Closed;
            return Ok(true);
        }

        if payload.len() > 2 {
            let mut validator = crate::utf8::Utf8Validator::new();
            if validator.validate(&payload[2..]) != crate::utf8::State::Ok {
                if peer_initiated {
                    self.write_frame(OpCode::Close, true, &CLOSE_INVALID_PAYLOAD.to_be_bytes())
                        .await?;
                }
                self.state = ConnState::Closed;
                return Ok(true);
            }
        }

        if peer_initiated {
            self.write_frame(OpCode::Close, true, payload).await?;
        }
        self.state = ConnState::Closed;
        Ok(true)
    }

    /// Tears the connection down immediately on a protocol violation: sends
    /// a Close frame carrying `code` and marks the connection closed without
    /// waiting for the peer's echo.
    async fn fail_fast(&mut self, code: u16) -> Result<(), Error> {
        if self.state == ConnState::Open {
            let _ = self.write_frame(OpCode::Close, true, &code.to_be_bytes()).await;
        }
        self.state = ConnState::Closed;
        Ok(())
    }

    /// Drops an in-flight frame/fragment that has sat incomplete for
    /// `FRAGMENT_ASSEMBLY_TIMEOUT`. Per spec §4.3, this discards the
    /// accumulator and any partial message but leaves the connection open —
    /// unlike `fail_fast`, no Close frame is sent and `state` is untouched.
    fn discard_stale_partial(&mut self) {
        warn!("message timeout: discarding incomplete frame/fragment after 30s of inactivity");
        self.read_buf.clear();
        self.partial = None;
        self.waiting_since = None;
    }

    /// Processes one command from the public handle. Returns `Ok(true)` if
    /// the connection should stop after this command.
    async fn handle_command(&mut self, cmd: OutboundCommand) -> Result<bool, Error> {
        match cmd {
            OutboundCommand::Send(message) => {
                let opcode = match message.data_type() {
                    DataType::Text => OpCode::Text,
                    DataType::Binary => OpCode::Binary,
                };
                self.send_possibly_fragmented(opcode, message.into_bytes()).await?;
                Ok(false)
            }
            OutboundCommand::SendFragmentedStart(data_type, data) => {
                let opcode = match data_type {
                    DataType::Text => OpCode::Text,
                    DataType::Binary => OpCode::Binary,
                };
                self.write_frame(opcode, false, &data).await?;
                Ok(false)
            }
            OutboundCommand::SendFragmentedCont { fin, data } => {
                self.write_frame(OpCode::Continuation, fin, &data).await?;
                Ok(false)
            }
            OutboundCommand::Ping(data) => {
                self.write_frame(OpCode::Ping, true, &data).await?;
                Ok(false)
            }
            OutboundCommand::Close(code) => {
                self.write_frame(OpCode::Close, true, &code.to_be_bytes()).await?;
                self.state = ConnState::CloseSent;
                Ok(false)
            }
        }
    }

    async fn send_possibly_fragmented(&mut self, opcode: OpCode, data: Vec<u8>) -> Result<(), Error> {
        if data.len() <= self.config.max_frame_size {
            return self.write_frame(opcode, true, &data).await;
        }

        let mut chunks = data.chunks(self.config.max_frame_size);
        let first = chunks.next().unwrap_or(&[]);
        self.write_frame(opcode, false, first).await?;

        let mut remaining: Vec<&[u8]> = chunks.collect();
        let last = remaining.pop();
        for chunk in remaining {
            self.write_frame(OpCode::Continuation, false, chunk).await?;
        }
        self.write_frame(OpCode::Continuation, true, last.unwrap_or(&[])).await
    }

    /// Writes a single frame, masking it first if this connection is
    /// playing the client role (spec §4.4 — masking is mandatory
    /// client→server, forbidden server→client).
    async fn write_frame(&mut self, opcode: OpCode, fin: bool, payload: &[u8]) -> Result<(), Error> {
        let mask = match self.role {
            Role::Client => {
                let mut key = [0u8; 4];
                rand::thread_rng().fill_bytes(&mut key);
                Some(key)
            }
            Role::Server => None,
        };

        let header = build_header(opcode, fin, mask, payload.len() as u64);
        self.writer.write_all(&header).await?;

        if let Some(mask) = mask {
            let mut masked = payload.to_vec();
            apply_mask(&mut masked, mask);
            self.writer.write_all(&masked).await?;
        } else {
            self.writer.write_all(payload).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }
}

/// Validates a close code per RFC 6455 §7.4.1, grounded in (and fixing the
/// bitwise-vs-logical operator slip in) `checkCloseCode` from the original
/// implementation: 0-999 are unused, 1004-1006 and 1012-1015 are reserved
/// for the protocol itself, 1016-2999 are reserved for future protocol
/// revisions, and nothing above 4999 is a valid 16-bit close code range a
/// peer should be sending.
fn is_valid_close_code(code: u16) -> bool {
    if code < 1000 {
        return false;
    }
    if code > 4999 {
        return false;
    }
    if (1004..=1006).contains(&code) {
        return false;
    }
    if (1012..=1015).contains(&code) {
        return false;
    }
    if (1016..3000).contains(&code) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_close_codes() {
        assert!(is_valid_close_code(CLOSE_NORMAL));
        assert!(is_valid_close_code(CLOSE_GOING_AWAY));
        assert!(is_valid_close_code(3000));
        assert!(is_valid_close_code(4999));
    }

    #[test]
    fn invalid_close_codes() {
        assert!(!is_valid_close_code(999));
        assert!(!is_valid_close_code(1005)); // reserved, never sent on the wire
        assert!(!is_valid_close_code(1014));
        assert!(!is_valid_close_code(2999));
        assert!(!is_valid_close_code(5000));
    }

    #[tokio::test]
    async fn client_and_server_complete_handshake_over_a_duplex_pipe() {
        let (client_io, server_io) = tokio::io::duplex(8192);

        let server_task = tokio::spawn(async move {
            Connection::accept(server_io, WebSocketConfig::default())
                .await
                .unwrap();
        });

        Connection::connect(client_io, "/chat", "localhost", WebSocketConfig::default())
            .await
            .unwrap();

        server_task.await.unwrap();
    }

    /// Per spec §4.3, a message that sits incomplete past the fragment
    /// assembly timeout is dropped, but the connection itself stays open —
    /// this is never a `fail_fast`, so `state` must not change.
    #[tokio::test]
    async fn discard_stale_partial_keeps_the_connection_open() {
        let (_client_io, server_io) = tokio::io::duplex(64);
        let mut conn = Connection::new(server_io, Role::Server, WebSocketConfig::default(), Vec::new());

        conn.read_buf.extend_from_slice(&[0x01, 0x02, 0x03]);
        conn.partial = Some(PartialMessage::new(OpCode::Text));
        conn.waiting_since = Some(Instant::now());

        conn.discard_stale_partial();

        assert!(conn.read_buf.is_empty());
        assert!(conn.partial.is_none());
        assert!(conn.waiting_since.is_none());
        assert_eq!(conn.state, ConnState::Open);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_its_payload_is_buffered() {
        let (_client_io, server_io) = tokio::io::duplex(64);
        let mut conn = Connection::new(
            server_io,
            Role::Server,
            WebSocketConfig {
                max_frame_size: 16,
                max_message_size: 64 << 20,
            },
            Vec::new(),
        );

        // a masked Binary header advertising a 1000-byte payload, well over
        // max_frame_size, with none of the payload bytes actually present.
        let header = build_header(OpCode::Binary, true, Some([0, 0, 0, 0]), 1000);
        conn.read_buf.extend_from_slice(&header);

        struct NoMessages;
        #[async_trait::async_trait]
        impl WebSocketHandler for NoMessages {
            async fn on_message(&mut self, _message: crate::message::Message) {
                panic!("no message should ever be assembled for a rejected frame");
            }
        }
        let mut handler = NoMessages;

        let closed = conn.pump_frames(&mut handler).await.unwrap();
        assert!(closed);
        assert_eq!(conn.state, ConnState::Closed);
    }
}
