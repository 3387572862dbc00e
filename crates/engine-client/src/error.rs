//! Engine client error types.

use thiserror::Error;

/// Errors that can occur while talking to the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Session establishment failed (bad address, transport setup).
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Operation against a handle whose session was closed.
    #[error("Invalid handle: session closed")]
    InvalidHandle,

    /// Task queue name rejected by the worker factory.
    #[error("Invalid task queue: {0}")]
    InvalidTaskQueue(String),

    /// Wire-level failure on an engine call.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Engine answered with a non-success status.
    #[error("Engine rejected request: {0}")]
    Rejected(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e.to_string())
    }
}
