//! `Server`: owns the listening socket, the installed handler chain, and
//! graceful shutdown. The accept loop races `listener.accept()` against a
//! `Notify` that `shutdown()` fires; each accepted connection is spawned
//! onto its own task rather than tracked in a `JoinSet`, since shutdown
//! only needs to stop new accepts, not join every in-flight connection.

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::handler::Handler;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::select;
use tokio::sync::Notify;
use tracing::{info, info_span, Instrument};

/// An embeddable HTTP/1.1 server with transparent WebSocket upgrade.
pub struct Server {
    config: Arc<ServerConfig>,
    handlers: Arc<RwLock<Arc<Vec<Arc<dyn Handler>>>>>,
    shutdown: Arc<Notify>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Server {
            config: Arc::new(config),
            handlers: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Replaces the handler chain tried in order for every HTTP exchange.
    /// Outgoing handlers are notified via `cleanup`, and the
    /// new ones via `added_to_server`, before the swap is published.
    pub async fn set_handlers(&self, new_handlers: Vec<Arc<dyn Handler>>) {
        for handler in &new_handlers {
            handler.added_to_server().await;
        }
        let previous = {
            let mut guard = self.handlers.write().unwrap();
            std::mem::replace(&mut *guard, Arc::new(new_handlers))
        };
        for handler in previous.iter() {
            handler.cleanup().await;
        }
    }

    /// Binds `addr` and accepts connections until `shutdown` is called.
    pub async fn serve<A: ToSocketAddrs>(&self, addr: A) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Accepts connections on an already-bound listener until `shutdown`
    /// is called, spawning one task per connection. Split out from `serve` so
    /// callers that need the bound address before serving (e.g. binding to
    /// port 0 in tests) can bind first and hand the listener over.
    pub async fn serve_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        info!(local_addr = ?listener.local_addr().ok(), "listening");

        loop {
            select! {
                _ = self.shutdown.notified() => {
                    info!("shutdown requested, no longer accepting new connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(err) => {
                            tracing::warn!(error = %err, "accept failed, continuing to listen");
                        }
                    }
                }
            }
        }
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let handlers = self.handlers.clone();
        let config = self.config.clone();
        tokio::spawn(
            Connection::run(stream, peer, handlers, config)
                .instrument(info_span!("connection", %peer)),
        );
    }

    /// Unblocks a pending `accept()` and stops `serve` from accepting any
    /// further connections. In-flight connections are left to finish their
    /// current exchange on their own; this does not force-cancel them.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}
