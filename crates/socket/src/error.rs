//! Socket error types.

use tokio_tungstenite::tungstenite;

/// Errors produced by the connection registry and its transports.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("unknown socket descriptor: {0}")]
    UnknownDescriptor(String),

    #[error("socket {0} is not open")]
    NotOpen(String),

    #[error("connection closed")]
    Closed,

    #[error("invalid socket configuration: {0}")]
    Config(String),
}
