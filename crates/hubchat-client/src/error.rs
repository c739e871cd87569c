use thiserror::Error;

use hubchat_shared::ProtocolError;

/// Errors from the durable key-value storage backing the session slot.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage file exists but is not a JSON object of strings.
    #[error("Corrupt storage file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors surfaced by REST calls.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered 401. The session has already been cleared and
    /// the router sent to the login screen.
    #[error("Authentication required")]
    Unauthorized,

    #[error("Server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors raised by the hub transport. The connection manager absorbs all
/// of them except a failed initial handshake.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("Hub handshake failed: {0}")]
    Handshake(String),

    #[error("Hub handshake timed out")]
    HandshakeTimeout,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Hub connection is not active")]
    NotConnected,

    #[error("Hub connection lost: {0}")]
    ConnectionLost(String),

    /// The server completed the invocation with an error.
    #[error("Invocation failed: {0}")]
    Invocation(String),
}

/// Errors that stop the chat page from mounting.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("No session; redirected to login")]
    NotAuthenticated,

    #[error("Session rejected by the server; redirected to login")]
    Unauthorized,
}
