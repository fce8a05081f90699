//! Per-connection driver: owns the exchange currently running on a
//! socket and replaces it at most once, when an HTTP exchange upgrades to
//! WebSocket.

use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::http::exchange::{run_http_exchange, HttpExchangeOutcome};
use crate::http::stream::ByteStream;
use crate::http::OutputStream;
use crate::ws::exchange::run_websocket_exchange;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::io::BufWriter;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// The exchange a connection is currently running. `Http` loops internally
/// over any number of pipelined requests; when a handler upgrades one of
/// them, the connection replaces itself with `WebSocket` and runs exactly
/// once more before the socket closes — a connection runs at most twice.
enum Exchange {
    Http,
    WebSocket(crate::ws::exchange::WebSocketUpgrade),
}

pub struct Connection;

impl Connection {
    pub async fn run(
        stream: TcpStream,
        peer: SocketAddr,
        handlers: Arc<RwLock<Arc<Vec<Arc<dyn Handler>>>>>,
        config: Arc<ServerConfig>,
    ) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let mut reader = ByteStream::new(read_half, config.input_buffer_size);
        let mut writer: OutputStream = BufWriter::with_capacity(config.output_buffer_size, write_half);

        let mut exchange = Exchange::Http;

        loop {
            exchange = match exchange {
                Exchange::Http => {
                    let snapshot = handlers.read().unwrap().clone();
                    match run_http_exchange(&mut reader, &mut writer, &snapshot, &config).await {
                        Ok(HttpExchangeOutcome::Close) => {
                            debug!(%peer, "http exchange closed the connection");
                            return;
                        }
                        Ok(HttpExchangeOutcome::Upgraded(upgrade)) => Exchange::WebSocket(upgrade),
                        Err(err) => {
                            warn!(%peer, error = %err, "http exchange ended with an error");
                            return;
                        }
                    }
                }
                Exchange::WebSocket(upgrade) => {
                    run_websocket_exchange(reader, writer, upgrade, &config).await;
                    debug!(%peer, "websocket exchange closed the connection");
                    return;
                }
            };
        }
    }
}
