//! The per-exchange driver: read a request, hand it to the handler
//! chain, commit a response, then decide whether to loop for the next
//! pipelined request, hand off to a WebSocket exchange, or close.

use crate::config::ServerConfig;
use crate::error::{ExchangeError, ReadRequestError};
use crate::handler::{Handler, HttpContext};
use crate::http::body::HttpBody;
use crate::http::input::{prepare_request, read_request};
use crate::http::response::{write_bad_request_response, HttpResponse};
use crate::http::{InputStream, OutputStream};
use crate::ws::exchange::WebSocketUpgrade;
use std::sync::Arc;
use tracing::debug;

pub enum HttpExchangeOutcome {
    Close,
    Upgraded(WebSocketUpgrade),
}

/// Runs the keep-alive loop on one connection until it closes or a
/// handler upgrades it to WebSocket.
pub async fn run_http_exchange(
    reader: &mut InputStream,
    writer: &mut OutputStream,
    handlers: &[Arc<dyn Handler>],
    config: &ServerConfig,
) -> Result<HttpExchangeOutcome, ExchangeError> {
    loop {
        let raw = match read_request(reader).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(HttpExchangeOutcome::Close),
            Err(ReadRequestError::BadRequest(err)) => {
                let message = err.to_string();
                debug!(%message, "malformed request line or headers");
                write_bad_request_response(writer, &message).await?;
                return Ok(HttpExchangeOutcome::Close);
            }
            Err(ReadRequestError::Io(err)) => return Err(ExchangeError::Io(err)),
        };

        let request = match prepare_request(raw, config.maximum_request_body_size) {
            Ok(request) => request,
            Err(err) => {
                debug!(message = %err, "request failed post-parse validation");
                write_bad_request_response(writer, &err.0).await?;
                return Ok(HttpExchangeOutcome::Close);
            }
        };

        let mut body = HttpBody::for_request(&request, config.maximum_chunk_size);
        let mut response = HttpResponse::new(config.gzip_threshold);
        let mut upgrade: Option<WebSocketUpgrade> = None;

        let mut handled = false;
        for handler in handlers {
            let mut ctx = HttpContext {
                request: &request,
                reader: &mut *reader,
                writer: &mut *writer,
                body: &mut body,
                response: &mut response,
                upgrade: &mut upgrade,
            };
            handler.handle(&mut ctx).await?;
            if response.has_committed() || upgrade.is_some() {
                handled = true;
                break;
            }
        }

        if !handled {
            response
                .status(404)
                .send_string(writer, &request, "Not found.")
                .await?;
        }

        if !response.is_complete() {
            return Err(ExchangeError::InvariantViolation(
                "handler left the response uncommitted".into(),
            ));
        }

        if !body.is_consumed() {
            body.close(reader).await?;
        }

        if let Some(upgrade) = upgrade {
            return Ok(HttpExchangeOutcome::Upgraded(upgrade));
        }

        if response.will_close_after() {
            return Ok(HttpExchangeOutcome::Close);
        }

        warn_if_unread_trailers(&body);
    }
}

fn warn_if_unread_trailers(body: &HttpBody) {
    if let Some(trailers) = body.trailers() {
        if !trailers.is_empty() {
            debug!(count = trailers.len(), "chunked trailers were not consumed by a handler");
        }
    }
}
