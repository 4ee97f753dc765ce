//! Mail errors.

use thiserror::Error;

/// Errors raised while building or sending mail.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("message has no recipients")]
    NoRecipients,

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Result type for mail operations.
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;
