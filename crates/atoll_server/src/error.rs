//! Host error types.

use atoll_world::WorldError;
use thiserror::Error;

/// Errors produced by the host layer.
#[derive(Debug, Error)]
pub enum HostError {
    /// A world operation failed.
    #[error("World error: {0}")]
    World(#[from] WorldError),

    /// A frame could not be encoded for the wire.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// A client channel rejected a message.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The world task is no longer running.
    #[error("World task stopped")]
    Stopped,
}

impl HostError {
    /// Creates a channel error from any message.
    pub fn channel<S: Into<String>>(msg: S) -> Self {
        Self::Channel(msg.into())
    }
}

/// Result type alias for host operations.
pub type HostResult<T> = Result<T, HostError>;
