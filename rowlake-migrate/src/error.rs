//! Error types for the migration engine.

use thiserror::Error;

use rowlake_warehouse::WarehouseError;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Warehouse operation error.
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// Two registered migrations share a name.
    #[error("Duplicate migration name '{0}'")]
    DuplicateName(String),

    /// The ledger could not be read or written.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A migration definition failed while running.
    #[error("Migration '{name}' failed: {message}")]
    Migration {
        /// Migration name.
        name: String,
        /// Failure detail.
        message: String,
    },

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrateError {
    /// Create a ledger error.
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create a migration failure error.
    pub fn migration(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrateError::migration("create_users", "table rejected");
        let msg = err.to_string();
        assert!(msg.contains("create_users"));
        assert!(msg.contains("table rejected"));
    }

    #[test]
    fn test_warehouse_error_wraps() {
        let err: MigrateError = WarehouseError::duplicate("dataset exists").into();
        assert!(matches!(err, MigrateError::Warehouse(_)));
    }
}
