//! Protocol error types.

use thiserror::Error;

/// Protocol error type.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not a frame object
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame carried a payload that does not match its type
    #[error("Invalid payload for '{frame_type}': {reason}")]
    InvalidPayload { frame_type: String, reason: String },
}

/// Result type alias using ProtocolError.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
