//! Error types for sessionwire.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all sessionwire operations.
#[derive(Debug, Error)]
pub enum SessionwireError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed frame or body.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame body larger than the configured maximum.
    #[error("Frame body of {length} bytes exceeds maximum {max}")]
    FrameTooLarge { length: usize, max: usize },

    /// No handler registered for the message id.
    #[error("Handler not found for message ID: {0}")]
    HandlerNotFound(u16),

    /// A handler is already registered for the message id.
    #[error("Handler already registered for message ID: {0}")]
    DuplicateHandler(u16),

    /// A handler returned an error or panicked.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// The session has been closed.
    #[error("Session closed")]
    SessionClosed,

    /// Too many frames waiting to be written on one session.
    #[error("Send queue full")]
    SendQueueFull,

    /// No bytes received within the idle timeout.
    #[error("Session idle for {0:?}")]
    IdleTimeout(Duration),

    /// The dispatch queue no longer accepts items.
    #[error("Dispatch queue stopped")]
    QueueStopped,

    /// The dispatch queue reached its configured capacity.
    #[error("Dispatch queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using SessionwireError.
pub type Result<T> = std::result::Result<T, SessionwireError>;
