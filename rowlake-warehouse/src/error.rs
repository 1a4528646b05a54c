//! Error types for warehouse operations.

use thiserror::Error;

/// Result type alias for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Remote error code for "resource already exists".
pub const CODE_DUPLICATE: &str = "duplicate";
/// Remote error code for "resource not found".
pub const CODE_NOT_FOUND: &str = "notFound";

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The remote service rejected an operation. Carries the remote error
    /// code so callers can branch (already-exists, not-found) instead of
    /// treating every rejection as fatal.
    #[error("Warehouse API error [{code}]: {message}")]
    Api {
        /// Remote error code.
        code: String,
        /// Remote error message.
        message: String,
    },

    /// A query did not complete within the bounded poll policy.
    #[error("Query job '{handle}' did not complete after {attempts} poll attempts")]
    Timeout {
        /// Job handle of the stalled query.
        handle: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// A query job failed or returned an unusable result.
    #[error("Query job error: {0}")]
    Job(String),

    /// The source store failed during introspection or row iteration.
    #[error("Source store error: {0}")]
    Source(String),

    /// Row (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WarehouseError {
    /// Create an API error.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an already-exists API error.
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::api(CODE_DUPLICATE, message)
    }

    /// Create a not-found API error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::api(CODE_NOT_FOUND, message)
    }

    /// Create a job error.
    pub fn job(msg: impl Into<String>) -> Self {
        Self::Job(msg.into())
    }

    /// Create a source store error.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Whether this is an already-exists rejection.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == CODE_DUPLICATE)
    }

    /// Whether this is a not-found rejection.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == CODE_NOT_FOUND)
    }

    /// Whether this is a poll timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
