//! The WebSocket upgrade handshake (RFC 6455).

use crate::error::WebSocketUpgradeError;
use crate::handler::{HttpContext, WebSocketHandler};
use crate::ws::compression::NegotiatedCompression;
use crate::ws::exchange::WebSocketUpgrade;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(sha1(key + GUID))`. Verified against the RFC's
/// worked example in tests below.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.digest().bytes())
}

fn token_list_contains(value: &str, needle: &str) -> bool {
    value.split(',').any(|tok| tok.trim().eq_ignore_ascii_case(needle))
}

/// Parses a `Sec-WebSocket-Extensions` offer, accepting only a bare
/// `permessage-deflate` with the 15-bit default window on both sides.
/// Anything requesting a different window or an unknown parameter
/// is rejected, falling back to no compression rather than erroring the
/// handshake.
pub fn negotiate_permessage_deflate(header_value: &str) -> Option<NegotiatedCompression> {
    for offer in header_value.split(',') {
        let mut params = offer.split(';').map(str::trim);
        let name = params.next()?;
        if !name.eq_ignore_ascii_case("permessage-deflate") {
            continue;
        }

        let mut server_no_context_takeover = false;
        let mut client_no_context_takeover = false;
        let mut acceptable = true;

        for param in params {
            if param.is_empty() {
                continue;
            }
            let (key, value) = match param.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim().trim_matches('"'))),
                None => (param.trim(), None),
            };
            match key.to_ascii_lowercase().as_str() {
                "server_no_context_takeover" => server_no_context_takeover = true,
                "client_no_context_takeover" => client_no_context_takeover = true,
                "server_max_window_bits" | "client_max_window_bits" => match value {
                    None => {}
                    Some(v) => match v.parse::<u32>() {
                        Ok(15) => {}
                        _ => {
                            acceptable = false;
                            break;
                        }
                    },
                },
                _ => {
                    acceptable = false;
                    break;
                }
            }
        }

        if acceptable {
            return Some(NegotiatedCompression::new(
                server_no_context_takeover,
                client_no_context_takeover,
            ));
        }
    }
    None
}

async fn write_switching_protocols<W: AsyncWrite + Unpin>(
    writer: &mut W,
    accept_key: &str,
    subprotocol: Option<&str>,
    compression: &Option<NegotiatedCompression>,
) -> std::io::Result<()> {
    let mut out = format!(
        "HTTP/1.1 101 Switching Protocols\r\nupgrade: websocket\r\nconnection: Upgrade\r\nsec-websocket-accept: {}\r\n",
        accept_key
    );
    if let Some(protocol) = subprotocol {
        out.push_str(&format!("sec-websocket-protocol: {}\r\n", protocol));
    }
    if let Some(compression) = compression {
        out.push_str(&format!(
            "sec-websocket-extensions: {}\r\n",
            compression.response_header_value()
        ));
    }
    out.push_str("\r\n");
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await
}

/// Validates the request as a WebSocket upgrade and, on success,
/// writes the 101 response and stages the upgrade for the exchange loop
/// to pick up.
pub async fn upgrade_to_websocket(
    ctx: &mut HttpContext<'_>,
    handler: Box<dyn WebSocketHandler>,
    subprotocol: Option<&str>,
) -> Result<(), WebSocketUpgradeError> {
    let headers = &ctx.request.headers;

    let upgrade_ok = headers
        .get("upgrade")
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgrade_ok {
        return Err(WebSocketUpgradeError::InvalidHandshake(
            "Upgrade header must be \"websocket\"".into(),
        ));
    }

    let connection_ok = headers
        .get("connection")
        .map(|v| token_list_contains(&v, "upgrade"))
        .unwrap_or(false);
    if !connection_ok {
        return Err(WebSocketUpgradeError::InvalidHandshake(
            "Connection header must include the \"Upgrade\" token".into(),
        ));
    }

    let key = headers
        .get("sec-websocket-key")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            WebSocketUpgradeError::InvalidHandshake("missing Sec-WebSocket-Key header".into())
        })?;

    let version_ok = headers
        .get("sec-websocket-version")
        .map(|v| v.trim() == "13")
        .unwrap_or(false);
    if !version_ok {
        return Err(WebSocketUpgradeError::InvalidHandshake(
            "Sec-WebSocket-Version must be 13".into(),
        ));
    }

    let compression = headers
        .get("sec-websocket-extensions")
        .and_then(|v| negotiate_permessage_deflate(&v));

    let requested_protocol = headers.get("sec-websocket-protocol");
    let accepted_protocol = match (&requested_protocol, subprotocol) {
        (Some(offered), Some(wanted)) if token_list_contains(offered, wanted) => Some(wanted),
        _ => None,
    };

    let accept_key = compute_accept_key(&key);
    write_switching_protocols(&mut *ctx.writer, &accept_key, accepted_protocol, &compression).await?;
    ctx.response.mark_externally_completed();

    *ctx.upgrade = Some(WebSocketUpgrade {
        handler,
        compression,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc_example() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn negotiates_bare_permessage_deflate() {
        let negotiated = negotiate_permessage_deflate("permessage-deflate").unwrap();
        assert!(!negotiated.server_no_context_takeover);
    }

    #[test]
    fn rejects_non_default_window_bits() {
        assert!(negotiate_permessage_deflate("permessage-deflate; client_max_window_bits=10").is_none());
    }

    #[test]
    fn accepts_no_context_takeover_parameters() {
        let negotiated =
            negotiate_permessage_deflate("permessage-deflate; server_no_context_takeover").unwrap();
        assert!(negotiated.server_no_context_takeover);
    }
}
