//! An embeddable HTTP/1.1 server with transparent upgrade to WebSocket
//! (RFC 9112, RFC 6455, RFC 7692).
//!
//! The public surface is small: configure a [`Server`] with a
//! [`ServerConfig`], install one or more [`Handler`]s, and call
//! [`Server::serve`]. A handler that calls
//! [`ws::handshake::upgrade_to_websocket`] hands the rest of the
//! connection's lifetime to a [`WebSocketHandler`] actor.

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod http;
pub mod server;
pub mod ws;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{BadRequest, ExchangeError, WebSocketProtocolError, WebSocketUpgradeError};
pub use handler::{Handler, HttpContext, WebSocketHandler};
pub use http::body::HttpBody;
pub use http::header::{Header, HeaderList};
pub use http::input::HttpRequest;
pub use http::response::HttpResponse;
pub use server::Server;
pub use ws::exchange::{WebSocketSession, WebSocketUpgrade};
pub use ws::handshake::upgrade_to_websocket;
