//! WebSocket upgrade and messaging (RFC 6455, RFC 7692).

pub mod compression;
pub mod exchange;
pub mod frame;
pub mod handshake;
pub mod input;
