use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::time::error::Elapsed;
use url::ParseError;

use crate::message::OutboundCommand;

/// The crate's single error type. Protocol-level failures (bad opcode, bad
/// mask direction, invalid UTF-8, ...) are handled internally by the
/// connection state machine, which emits the matching close frame instead of
/// surfacing one of these — see `error::Error` only shows up for handshake
/// failures, transport failures and API misuse.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("operation timed out: {source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("payload is not valid UTF-8: {source}")]
    Utf8 {
        #[from]
        source: FromUtf8Error,
    },

    #[error("could not parse WebSocket URL: {source}")]
    UrlParse {
        #[from]
        source: ParseError,
    },

    #[error("invalid scheme in WebSocket URL, expected ws:// or wss://")]
    InvalidScheme,

    #[error(
        "wss:// endpoints require a pre-wrapped TLS stream; use connect_with_stream instead of client_open"
    )]
    TlsNotSupported,

    #[error("WebSocket URL has no host")]
    NoHost,

    // Handshake errors
    #[error("malformed HTTP request line")]
    MalformedRequestLine,

    #[error("request is missing the Sec-WebSocket-Key header")]
    MissingSecWebSocketKey,

    #[error("Sec-WebSocket-Key header value is not valid")]
    InvalidSecWebSocketKey,

    #[error("server response did not contain a valid Sec-WebSocket-Accept header")]
    MissingAcceptHeader,

    #[error("server's Sec-WebSocket-Accept token did not match the expected value")]
    AcceptMismatch,

    #[error("server did not upgrade the connection (expected HTTP/1.1 101)")]
    NotUpgraded,

    #[error("handshake did not complete within the allotted time")]
    HandshakeTimeout,

    // Framing errors (bytes that never reach the wire as a close frame
    // because the connection isn't connected yet, or the caller asked for
    // something invalid)
    #[error("opcode `{0:#x}` is not a recognized WebSocket opcode")]
    InvalidOpcode(u8),

    #[error("connection is not in the Connected state")]
    NotConnected,

    #[error("the outbound command channel was disconnected")]
    ChannelClosed,

    #[error("{source}")]
    SendError {
        #[from]
        source: SendError<OutboundCommand>,
    },
}
