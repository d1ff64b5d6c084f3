//! Common error types for portal-expose.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors raised while parsing or validating resources.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A tunnel size string is not one of the known tiers.
    #[error("invalid tunnel size: {0}, expected one of: small, medium, large")]
    InvalidTunnelSize(String),

    /// A resource spec violates a schema constraint.
    #[error("validation failed for {field}: {message}")]
    Validation {
        /// JSON path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl CoreError {
    /// Build a validation error for a field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}
