use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors produced by the chat client internals and the REST collaborator.
///
/// The realtime surface (`connect`, subscribe, send) never hands these to
/// callers; they are logged and the connection manager recovers on its own.
#[derive(Error, Debug)]
pub enum ChatError {
    /// WebSocket protocol error (connection failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// STOMP handshake rejected or never completed
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Malformed STOMP frame
    #[error("Frame error: {0}")]
    Frame(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error (REST collaborator)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid client options
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out (e.g., no CONNECTED frame within the handshake window)
    #[error("Timeout error")]
    Timeout,

    /// Attempted operation while not connected to the server
    #[error("Not connected")]
    NotConnected,
}

/// Convenience type alias for `Result<T, ChatError>`.
pub type Result<T> = std::result::Result<T, ChatError>;
