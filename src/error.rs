//! Error types

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the server and connection tasks
///
/// None of these are fatal to the process; they end at most one connection.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol or transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Upgrade did not complete in time
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Connection refused by the handler or by handshake validation
    #[error("connection rejected: {0}")]
    Rejected(String),
}
