//! # Rowlake
//!
//! Replicate schema and data from a row-oriented relational store into a
//! columnar, append-only analytical warehouse, and track applied schema
//! migrations in a ledger stored inside the warehouse itself.
//!
//! Rowlake provides:
//! - A type mapping engine turning relational column metadata into
//!   warehouse field schemas (with explicit struct hints for JSON columns)
//! - A dialect translator qualifying query-builder SQL against a default
//!   dataset and inlining bound values
//! - A chunked streaming-insert pipeline with per-row identity assignment
//! - A batch-numbered migration ledger with forward apply, rollback by
//!   batch or step count, and dry-run ("pretend") execution
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowlake::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api: Arc<dyn WarehouseApi> = connect_transport()?;
//!     let config = Arc::new(WarehouseConfig::new("acme-project", "analytics"));
//!
//!     let mut set = MigrationSet::new();
//!     set.register(Arc::new(CreateUsersTable))?;
//!
//!     let runner = Runner::new(api, config, set);
//!     let report = runner.run(&RunOptions::default()).await?;
//!     println!("{}", report.summary());
//!
//!     Ok(())
//! }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

/// Warehouse field schemas and source-column type mapping.
pub mod schema {
    pub use rowlake_schema::*;
}

/// Warehouse adapter: client trait, dialect translation, catalog, inserts,
/// query execution.
pub mod warehouse {
    pub use rowlake_warehouse::*;
}

/// Migration ledger, runner, and bulk data replication.
pub mod migrate {
    pub use rowlake_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        Migration, MigrationOps, MigrationSet, Replicator, RollbackOptions, RunOptions, Runner,
    };
    pub use crate::schema::{Field, FieldMode, FieldType, SourceColumn, StructHints};
    pub use crate::warehouse::{
        Catalog, InsertPipeline, QueryExecutor, Translator, WarehouseApi, WarehouseConfig,
    };
}

// Re-export the per-crate error types at the crate root
pub use rowlake_migrate::MigrateError;
pub use rowlake_warehouse::WarehouseError;
