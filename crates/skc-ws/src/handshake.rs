use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{Headers, WsError};

/// Fixed GUID appended to the client's nonce (RFC 6455 §1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";

/// `base64(sha1(key ‖ GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.as_bytes());
    sha.update(WS_GUID.as_bytes());
    STANDARD.encode(sha.finalize())
}

/// The handful of HTTP responses the firmware ever sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    SwitchingProtocols { accept: String },
    Html(String),
    NotFound,
    /// The body is the error text, surfaced verbatim to the client.
    InternalError(String),
}

impl Response {
    /// Build the upgrade response for a request, using its first `Sec-WebSocket-Key`.
    pub fn upgrade(headers: &Headers) -> Result<Self, WsError> {
        let key = headers.first(SEC_WEBSOCKET_KEY).ok_or(WsError::MissingKey)?;
        Ok(Response::SwitchingProtocols {
            accept: accept_key(key),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::SwitchingProtocols { accept } => format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {accept}\r\n\
                 \r\n"
            )
            .into_bytes(),
            Response::Html(body) => with_body("200 OK", Some("text/html"), body),
            Response::NotFound => with_body("404 Not Found", None, "Not Found!"),
            Response::InternalError(body) => with_body("500 Internal Error", None, body),
        }
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), WsError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn with_body(status: &str, content_type: Option<&str>, body: &str) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    if let Some(content_type) = content_type {
        out.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));
    out.push_str(body);
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_accept_vector() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn upgrade_requires_a_key() {
        assert!(matches!(
            Response::upgrade(&Headers::new()),
            Err(WsError::MissingKey)
        ));
    }

    #[test]
    fn upgrade_uses_the_first_key() {
        let mut headers = Headers::new();
        headers.append("Sec-WebSocket-Key", "f5iN+gp/nlMa6saS2nKaKQ==");
        headers.append("Sec-WebSocket-Key", "ignored");

        let text = String::from_utf8(Response::upgrade(&headers).unwrap().to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: 34/j6I2+TlTA65iZZJBJl/oRO+I=\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn plain_responses() {
        assert_eq!(
            Response::NotFound.to_bytes(),
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 10\r\nConnection: close\r\n\r\nNot Found!"
        );
        let text = String::from_utf8(Response::InternalError("boom".into()).to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 500 Internal Error\r\n"));
        assert!(text.ends_with("\r\n\r\nboom"));
        let text = String::from_utf8(Response::Html("<p>".into()).to_bytes()).unwrap();
        assert!(text.contains("Content-Type: text/html\r\n"));
    }
}
