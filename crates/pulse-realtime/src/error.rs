//! Client error types.

use pulse_protocol::ProtocolError;
use thiserror::Error;

/// Close codes the server uses to reject credentials on an open socket.
pub(crate) const AUTH_CLOSE_CODES: [u16; 3] = [1008, 4001, 4401];

/// Realtime client error type.
#[derive(Error, Debug)]
pub enum ClientError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Endpoint URL could not be built
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Frame encoding/decoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server rejected the credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// The connection manager task is gone
    #[error("Connection manager stopped")]
    ManagerStopped,
}

/// Result type alias using ClientError.
pub type ClientResult<T> = Result<T, ClientError>;
