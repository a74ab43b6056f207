//! Client error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Local store could not be read or written
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("Server rejected event ({0}): {1}")]
    Rejected(u16, String),

    /// Event could not be built from local state
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl From<ethica_common::Error> for ClientError {
    fn from(err: ethica_common::Error) -> Self {
        ClientError::InvalidEvent(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
