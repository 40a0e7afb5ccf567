//! Client-side URL handling: turning a `ws://`/`wss://` endpoint URL into
//! the pieces the handshake and the TCP dialer need. Grounded in the
//! teacher's `request.rs::construct_http_request`.

use crate::error::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    /// `host:port`, suitable for `TcpStream::connect`.
    pub host_with_port: String,
    /// Hostname only, used in the request's `Host:` header when no
    /// non-default port is present.
    pub host: String,
    pub port: u16,
    /// Request target, e.g. `/chat?room=1`.
    pub path: String,
    /// Set when the URL used the `wss://` scheme. This crate never dials
    /// TLS itself (Non-goal); callers inspect this flag and wrap the
    /// stream themselves before connecting.
    pub use_tls: bool,
}

pub fn parse_endpoint(ws_url: &str) -> Result<ParsedEndpoint, Error> {
    let parsed = Url::parse(ws_url)?;

    let use_tls = match parsed.scheme() {
        "ws" => false,
        "wss" => true,
        _ => return Err(Error::InvalidScheme),
    };
    let default_port = if use_tls { 443 } else { 80 };

    let host = parsed.host_str().ok_or(Error::NoHost)?.to_string();
    let port = parsed.port().unwrap_or(default_port);
    let host_with_port = format!("{host}:{port}");

    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    Ok(ParsedEndpoint {
        host_with_port,
        host,
        port,
        path,
        use_tls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_ws_url() {
        let p = parse_endpoint("ws://localhost:8080/chat").unwrap();
        assert_eq!(p.host_with_port, "localhost:8080");
        assert_eq!(p.host, "localhost");
        assert_eq!(p.port, 8080);
        assert_eq!(p.path, "/chat");
        assert!(!p.use_tls);
    }

    #[test]
    fn defaults_port_from_scheme() {
        let p = parse_endpoint("ws://example.com/").unwrap();
        assert_eq!(p.port, 80);

        let p = parse_endpoint("wss://example.com/").unwrap();
        assert_eq!(p.port, 443);
        assert!(p.use_tls);
    }

    #[test]
    fn rejects_non_ws_scheme() {
        assert!(matches!(
            parse_endpoint("http://localhost:8080"),
            Err(Error::InvalidScheme)
        ));
    }

    #[test]
    fn keeps_query_string_in_path() {
        let p = parse_endpoint("ws://localhost/socket?token=abc").unwrap();
        assert_eq!(p.path, "/socket?token=abc");
    }
}
