//! Bridge error types.

use engine_client::EngineError;
use thiserror::Error;

/// Errors surfaced by the connection supervisor and pool manager.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Operation requires a live engine connection that does not exist.
    #[error("Not connected to the workflow engine")]
    NotConnected,

    /// Establishing the engine connection failed. Terminal for that serve
    /// attempt; restart policy belongs to the host.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Worker-pool construction or capability discovery failed. The
    /// previously-active pool, if any, is left untouched.
    #[error("Pool build failed: {0}")]
    PoolBuildFailed(String),

    /// A reset is already in flight.
    #[error("Reset already in progress")]
    ResetInProgress,

    /// Operation against a worker handle whose parent connection was
    /// destroyed.
    #[error("Invalid worker handle: parent connection destroyed")]
    InvalidHandle,

    /// Engine call failure passed through the RPC facade.
    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for BridgeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::ConnectFailed(msg) => BridgeError::ConnectFailed(msg),
            EngineError::InvalidHandle => BridgeError::InvalidHandle,
            other => BridgeError::Engine(other),
        }
    }
}
