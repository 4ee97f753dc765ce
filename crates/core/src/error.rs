//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid certificate record: {0}")]
    InvalidCertificate(String),

    #[error("invalid expiry timestamp '{value}': {reason}")]
    InvalidExpiry { value: String, reason: String },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a field-level validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
