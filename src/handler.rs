//! The application-facing traits: an HTTP handler chain
//! tried in order until one commits a response, and a per-connection
//! WebSocket actor that consumes and returns itself across events.

use crate::http::body::HttpBody;
use crate::http::input::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::{InputStream, OutputStream};
use crate::ws::exchange::WebSocketUpgrade;
use async_trait::async_trait;
use std::io;

/// Everything a handler needs to inspect the request and commit a
/// response or an upgrade, bundled so the handler chain can hand the same
/// borrow set to each candidate in turn.
pub struct HttpContext<'a> {
    pub request: &'a HttpRequest,
    pub reader: &'a mut InputStream,
    pub writer: &'a mut OutputStream,
    pub body: &'a mut HttpBody,
    pub response: &'a mut HttpResponse,
    pub upgrade: &'a mut Option<WebSocketUpgrade>,
}

/// An HTTP handler. A handler "handles" a request by either
/// committing `ctx.response` (via one of its write surfaces) or by setting
/// `*ctx.upgrade`; leaving both untouched tells the exchange loop to try
/// the next handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut HttpContext<'_>) -> io::Result<()>;

    /// Called once when this handler is installed via `Server::set_handlers`.
    async fn added_to_server(&self) {}

    /// Called once when this handler is replaced or the server shuts down.
    async fn cleanup(&self) {}
}

/// A per-connection WebSocket actor: a tiny state machine where state steps
/// forward in response to each event. Each method consumes `self` and
/// returns the next state,
/// letting a handler implementation swap its own type across events.
#[async_trait]
pub trait WebSocketHandler: Send {
    async fn on_start(self: Box<Self>) -> Box<dyn WebSocketHandler>;

    async fn on_text(self: Box<Self>, session: &crate::ws::exchange::WebSocketSession, text: String) -> Box<dyn WebSocketHandler>;

    async fn on_binary(self: Box<Self>, session: &crate::ws::exchange::WebSocketSession, data: Vec<u8>) -> Box<dyn WebSocketHandler>;

    /// Default: reply with a Pong carrying the same payload (RFC 6455).
    async fn on_ping(self: Box<Self>, session: &crate::ws::exchange::WebSocketSession, payload: Vec<u8>) -> Box<dyn WebSocketHandler> {
        let _ = session.send_pong(payload).await;
        self
    }

    async fn on_pong(self: Box<Self>, _session: &crate::ws::exchange::WebSocketSession, _payload: Vec<u8>) -> Box<dyn WebSocketHandler> {
        self
    }

    async fn on_close(self: Box<Self>, _code: u16, _reason: String) {}
}
