//! # rowlake-migrate
//!
//! Migration engine for the Rowlake warehouse adapter.
//!
//! This crate provides:
//! - The [`Migration`] contract: named `up`/`down` definitions running
//!   against an explicit [`MigrationOps`] context
//! - The [`Ledger`]: an append-only warehouse table recording
//!   `(migration, batch)` — the durable migration state lives inside the
//!   warehouse itself, not in the relational store
//! - The [`Runner`]: applies pending migrations in name order under one
//!   batch number, rolls back by last batch or step count, and supports
//!   dry-run ("pretend") execution that renders intended operations
//!   without touching the warehouse
//! - The [`Replicator`]: chunked bulk copy of source tables into their
//!   warehouse counterparts
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌──────────┐     ┌──────────────────┐
//! │ Runner     │────▶│ Ledger   │────▶│ migrations table │
//! └────────────┘     └──────────┘     └──────────────────┘
//!       │
//!       ▼
//! ┌────────────┐     ┌──────────────────────────────┐
//! │ Migration  │────▶│ Catalog / Executor / Inserts │
//! └────────────┘     └──────────────────────────────┘
//! ```
//!
//! A failed `up()` or `down()` aborts the rest of the run; nothing is
//! rolled back automatically, so the operator reconciles ledger and
//! catalog state after a failure. Exactly one runner is assumed to act
//! on a dataset at a time — batch numbering takes no lock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rowlake_migrate::{Migration, MigrationOps, MigrationSet, RunOptions, Runner};
//!
//! struct CreateUsersTable;
//!
//! #[async_trait::async_trait]
//! impl Migration for CreateUsersTable {
//!     fn name(&self) -> &str {
//!         "2018_03_05_113026_create_users_table"
//!     }
//!
//!     async fn up(&self, ops: &dyn MigrationOps) -> rowlake_migrate::MigrateResult<()> {
//!         ops.create_table(
//!             "users",
//!             vec![Field::new("username", FieldType::String).required()],
//!             None,
//!         )
//!         .await
//!     }
//!
//!     async fn down(&self, ops: &dyn MigrationOps) -> rowlake_migrate::MigrateResult<()> {
//!         ops.delete_table("users", None).await
//!     }
//! }
//! ```

pub mod error;
pub mod ledger;
pub mod migration;
pub mod replicate;
pub mod runner;

// Re-exports
pub use error::{MigrateError, MigrateResult};
pub use ledger::{Ledger, LedgerBootstrap, LedgerEntry, LEDGER_TABLE};
pub use migration::{LiveOps, Migration, MigrationOps, MigrationSet, PretendOps};
pub use replicate::{Replicator, TableReport};
pub use runner::{RollbackOptions, RollbackReport, RunOptions, RunReport, Runner};
