//! Common error types for Ethica

use thiserror::Error;

/// Common result type for Ethica operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the tracking core and its services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed required input. Nothing was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credential without the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for storage failures a caller may retry safely.
    ///
    /// Every write path is an idempotent upsert, so replaying the whole
    /// operation after one of these cannot duplicate rows.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(err) => is_lock_error(err) || matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

/// SQLite reports writer contention as SQLITE_BUSY ("database is locked")
pub(crate) fn is_lock_error(err: &sqlx::Error) -> bool {
    let message = err.to_string();
    message.contains("database is locked") || message.contains("database table is locked")
}
