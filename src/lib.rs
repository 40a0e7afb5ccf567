//! A compact RFC 6455 WebSocket implementation, usable from both clients
//! and servers, with no dependency on any particular HTTP framework or TLS
//! stack: transports are `AsyncRead + AsyncWrite`, so a caller terminates
//! TLS (or anything else) before handing the crate a stream.

mod client;
mod config;
mod connection;
mod error;
mod frame;
mod handler;
mod handshake;
mod message;
mod registry;
mod request;
mod server;
mod utf8;

pub use client::{client_open, connect, connect_with_stream, ClientHandle};
pub use config::{ClientConfig, ServerConfig, WebSocketConfig};
pub use connection::{Connection, Role};
pub use error::Error;
pub use handler::WebSocketHandler;
pub use message::{DataType, Message};
pub use registry::{ConnectionHandle, Registry};
pub use request::ParsedEndpoint;
pub use server::{server_open, start_server, ServerHandle};
