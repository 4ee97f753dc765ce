//! Source connector errors.

use thiserror::Error;

/// Errors raised by a certificate source. Each one halts only the source
/// that raised it.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("remote command failed: {0}")]
    Command(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
