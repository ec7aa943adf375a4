//! HTTP upgrade handshake for the endpoint transport (client side).

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// GUID mixed into the accept-key digest (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the expected `Sec-WebSocket-Accept` value for a request key.
///
/// The accept key is `Base64(SHA-1(key + GUID))`.
///
/// # Example
///
/// ```
/// use fanbench::ws::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a random 16-byte upgrade key, base64 encoded.
///
/// Falls back to a time-derived key if the system RNG is unavailable.
#[must_use]
pub fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    if getrandom::getrandom(&mut bytes).is_err() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0x5DEECE66D);
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = ((seed >> (i * 4)) & 0xFF) as u8;
        }
    }
    BASE64.encode(bytes)
}

/// Upgrade request sent by the harness when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Host header value.
    pub host: String,
    /// Request path.
    pub path: String,
    /// Origin header value.
    pub origin: String,
    /// The Sec-WebSocket-Key this request carries.
    pub key: String,
}

impl UpgradeRequest {
    /// Create an upgrade request with a freshly generated key.
    #[must_use]
    pub fn new(host: impl Into<String>, path: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            origin: origin.into(),
            key: generate_key(),
        }
    }

    /// Serialize the request to raw HTTP bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Origin: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            self.path, self.host, self.origin, self.key
        )
        .into_bytes()
    }
}

/// Parsed upgrade response from the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
}

impl UpgradeResponse {
    /// Parse an upgrade response from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8.
    /// - The status line is missing or not `101`.
    /// - The `Upgrade`, `Connection` or `Sec-WebSocket-Accept` headers are
    ///   missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines);

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers
            .get("connection")
            .ok_or_else(|| Error::InvalidHandshake("Missing Connection header".into()))?;
        if !connection.to_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();

        Ok(Self { accept })
    }

    /// Check the accept value against the key the request carried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on a mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept == compute_accept_key(key) {
            Ok(())
        } else {
            Err(Error::InvalidHandshake(
                "Sec-WebSocket-Accept mismatch".into(),
            ))
        }
    }
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6455 Section 1.3 example
    #[test]
    fn test_compute_accept_key_rfc_example() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_generate_key_is_16_bytes() {
        let key = generate_key();
        let decoded = BASE64.decode(&key).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn test_request_serialization() {
        let request = UpgradeRequest {
            host: "endpoint:9000".into(),
            path: "/connection".into(),
            origin: "http://localhost/".into(),
            key: "dGhlIHNhbXBsZSBub25jZQ==".into(),
        };
        let text = String::from_utf8(request.to_bytes()).unwrap();
        assert!(text.starts_with("GET /connection HTTP/1.1\r\n"));
        assert!(text.contains("Host: endpoint:9000\r\n"));
        assert!(text.contains("Origin: http://localhost/\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_parse_response() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";
        let parsed = UpgradeResponse::parse(response).unwrap();
        assert_eq!(parsed.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_parse_response_case_insensitive_headers() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            UPGRADE: WebSocket\r\n\
            CONNECTION: upgrade\r\n\
            SEC-WEBSOCKET-ACCEPT: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";
        let parsed = UpgradeResponse::parse(response).unwrap();
        assert_eq!(parsed.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_parse_response_wrong_status() {
        let response = b"HTTP/1.1 403 Forbidden\r\n\r\n";
        let err = UpgradeResponse::parse(response).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("101")));
    }

    #[test]
    fn test_parse_response_missing_accept() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            \r\n";
        let err = UpgradeResponse::parse(response).unwrap_err();
        assert!(
            matches!(err, Error::InvalidHandshake(msg) if msg.contains("Sec-WebSocket-Accept"))
        );
    }

    #[test]
    fn test_verify_accept_key() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let good = UpgradeResponse {
            accept: compute_accept_key(key),
        };
        assert!(good.verify(key).is_ok());

        let bad = UpgradeResponse {
            accept: "bogus".into(),
        };
        assert!(bad.verify(key).is_err());
    }

    #[test]
    fn test_request_response_roundtrip() {
        let request = UpgradeRequest::new("endpoint:9000", "/", "http://localhost/");
        let response = UpgradeResponse {
            accept: compute_accept_key(&request.key),
        };
        assert!(response.verify(&request.key).is_ok());
    }
}
