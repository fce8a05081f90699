//! Error taxonomy for the protocol engine.
//!
//! `BadRequest` and `WebSocketProtocolError` are recoverable: the exchange
//! loops catch them locally and turn them into a wire-level response (a 400,
//! or a WebSocket Close frame). `ExchangeError` is what escapes an exchange
//! loop entirely and reaches the connection task, which just logs and tears
//! the socket down.

use thiserror::Error;

/// A malformed request. The message is the exact text written into the 400
/// response body: the 400 response is plain text carrying the specific
/// parse error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BadRequest(pub String);

impl BadRequest {
    pub fn new(message: impl Into<String>) -> Self {
        BadRequest(message.into())
    }
}

/// A WebSocket protocol violation, carrying the close code to send back:
/// 1002 for most violations, 1009 for oversize frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("WebSocket protocol error {code}: {message}")]
pub struct WebSocketProtocolError {
    pub code: u16,
    pub message: String,
}

impl WebSocketProtocolError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        WebSocketProtocolError {
            code,
            message: message.into(),
        }
    }
}

/// The error type returned by a single HTTP exchange iteration. Anything
/// other than `Io` is handled locally before it ever reaches this type;
/// `InvariantViolation` exists solely for the "response not COMPLETE after a
/// handler ran" programmer-error assertion.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    BadRequest(#[from] BadRequest),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// Errors that can occur while pulling a request off the wire: either a true
/// I/O failure, or a parse failure that should be reported to the client as
/// a 400. Kept distinct from `ExchangeError` so parsing code stays agnostic
/// of how its caller chooses to react.
#[derive(Debug, Error)]
pub enum ReadRequestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    BadRequest(#[from] BadRequest),
}

impl From<ReadRequestError> for ExchangeError {
    fn from(err: ReadRequestError) -> Self {
        match err {
            ReadRequestError::Io(e) => ExchangeError::Io(e),
            ReadRequestError::BadRequest(e) => ExchangeError::BadRequest(e),
        }
    }
}

/// Errors from decoding an inbound WebSocket frame.
#[derive(Debug, Error)]
pub enum ReadFrameError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] WebSocketProtocolError),
}

/// Errors from a failed upgrade attempt: the request didn't ask for
/// a WebSocket upgrade correctly. The caller responds with a plain 400.
#[derive(Debug, Error)]
pub enum WebSocketUpgradeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidHandshake(String),
}
