//! Minimal demonstration: a plain-text HTTP handler plus a WebSocket echo
//! handler that also echoes back through permessage-deflate when offered.

use async_trait::async_trait;
use duplexhttp::{
    upgrade_to_websocket, Handler, HttpContext, Server, ServerConfig, WebSocketHandler,
    WebSocketSession,
};
use std::io;
use tracing_subscriber::EnvFilter;

struct RootHandler;

#[async_trait]
impl Handler for RootHandler {
    async fn handle(&self, ctx: &mut HttpContext<'_>) -> io::Result<()> {
        if ctx.request.target == "/" {
            ctx.response
                .send_string(&mut *ctx.writer, ctx.request, "Hello World!")
                .await?;
        }
        Ok(())
    }
}

struct WebSocketUpgradeHandler;

#[async_trait]
impl Handler for WebSocketUpgradeHandler {
    async fn handle(&self, ctx: &mut HttpContext<'_>) -> io::Result<()> {
        if ctx.request.target != "/ws" {
            return Ok(());
        }
        if upgrade_to_websocket(ctx, Box::new(EchoActor), None)
            .await
            .is_err()
        {
            ctx.response
                .status(400)
                .send_string(&mut *ctx.writer, ctx.request, "Expected a WebSocket upgrade request.")
                .await?;
        }
        Ok(())
    }
}

struct EchoActor;

#[async_trait]
impl WebSocketHandler for EchoActor {
    async fn on_start(self: Box<Self>) -> Box<dyn WebSocketHandler> {
        self
    }

    async fn on_text(self: Box<Self>, session: &WebSocketSession, text: String) -> Box<dyn WebSocketHandler> {
        let _ = session.send_text(text).await;
        self
    }

    async fn on_binary(self: Box<Self>, session: &WebSocketSession, data: Vec<u8>) -> Box<dyn WebSocketHandler> {
        let _ = session.send_binary(data).await;
        self
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = Server::new(ServerConfig::default());
    server
        .set_handlers(vec![
            std::sync::Arc::new(WebSocketUpgradeHandler),
            std::sync::Arc::new(RootHandler),
        ])
        .await;

    server.serve("127.0.0.1:8080").await
}
