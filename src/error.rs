//! Error types for stompwire.

use thiserror::Error;

/// Structural frame errors.
///
/// A frame that is merely incomplete is never an error; these describe
/// input that can never become a valid frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A header line did not contain a `:` separator.
    #[error("header line has no ':' separator: {line:?}")]
    MissingColon { line: String },

    /// The `content-length` header value is not a non-negative integer.
    #[error("invalid content-length value: {value:?}")]
    InvalidContentLength { value: String },

    /// The command or a header line is not valid UTF-8.
    #[error("frame text is not valid UTF-8")]
    InvalidUtf8,

    /// Buffered frame bytes exceed the configured maximum.
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
}

/// Main error type for all stompwire operations.
#[derive(Debug, Error)]
pub enum StompError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound byte stream violated the frame structure.
    #[error("Protocol error: {0}")]
    Parse(#[from] ParseError),

    /// A non-heartbeat frame was serialized without a command.
    #[error("Frame has no command")]
    MissingCommand,

    /// The transport has no live connection.
    #[error("Not connected")]
    NotConnected,

    /// `send` was called after `shutdown`.
    #[error("Transport is shutting down")]
    ShutdownRequested,

    /// The connection closed before the operation completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - send queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// JSON configuration error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using StompError.
pub type Result<T> = std::result::Result<T, StompError>;
