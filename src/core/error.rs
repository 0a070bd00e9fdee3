use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Model not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Malformed frame: {0}")]
    StreamDecode(String),
    #[error("Model server returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("A reply is still streaming for this session")]
    SessionBusy,
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

impl ManagerError {
    /// Classify a reqwest failure into the error kind callers match on.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return ManagerError::Timeout(timeout);
        }
        if err.is_connect() {
            return ManagerError::ConnectionFailure(err.to_string());
        }
        if err.is_decode() {
            return ManagerError::StreamDecode(err.to_string());
        }
        ManagerError::Http(err)
    }

    /// Map an `{"error": "..."}` message from the server. Ollama reports
    /// missing models both as HTTP 404 and as in-band pull errors.
    pub fn from_server_message(model: &str, status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if status == 404 || lower.contains("not found") || lower.contains("does not exist") {
            return ManagerError::NotFound(model.to_string());
        }
        ManagerError::Upstream { status, message }
    }
}

impl From<serde_json::Error> for ManagerError {
    fn from(err: serde_json::Error) -> Self {
        ManagerError::StreamDecode(err.to_string())
    }
}
