//! # rowlake-warehouse
//!
//! Adapter for an append-only, columnar analytical warehouse.
//!
//! This crate provides:
//! - The [`WarehouseApi`] capability trait consumed by every component —
//!   the low-level transport/auth client behind it is an external
//!   collaborator
//! - [`Translator`]: rewrites relational query-builder output into
//!   warehouse-qualified SQL (dataset prefixing, bound-value inlining)
//! - [`Catalog`]: dataset and table lifecycle, including the implicit
//!   leading `id` field on every created table
//! - [`InsertPipeline`]: streaming inserts with per-row identity
//!   assignment, nested-struct inference and per-row failure detail
//! - [`QueryExecutor`]: submits SQL, polls completion under a bounded
//!   [`PollPolicy`], and reshapes flat rows into eager-load groupings
//!
//! The warehouse is eventually consistent and append-only; nothing here
//! promises transactional semantics. Identity assignment (`max(id) + 1`)
//! and ledger batch numbering assume a single writer per dataset.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowlake_warehouse::{Catalog, QueryExecutor, WarehouseConfig};
//! use std::sync::Arc;
//!
//! let config = Arc::new(WarehouseConfig::new("acme-project", "analytics"));
//! let catalog = Catalog::new(api.clone(), config.clone());
//! let executor = QueryExecutor::new(api, config);
//!
//! catalog.create_dataset(None).await?;
//! let max = executor.max_id("orders", None).await?;
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod insert;
pub mod poll;
pub mod sql;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use catalog::Catalog;
pub use client::{
    FailedRow, InsertOptions, InsertRequest, InsertResponse, JobHandle, QueryState, Row, RowError,
    SourceStore, WarehouseApi,
};
pub use config::WarehouseConfig;
pub use error::{WarehouseError, WarehouseResult};
pub use executor::{QueryExecutor, SelectWith};
pub use insert::{InsertOutcome, InsertPipeline, DEFAULT_CHUNK_SIZE};
pub use poll::PollPolicy;
pub use sql::{BindValue, JoinClause, QueryDescriptor, QuerySource, Translator};
