//! Capability traits for the warehouse and the relational source store.
//!
//! The transports behind these traits are external collaborators: a real
//! deployment implements [`WarehouseApi`] over the warehouse's HTTP API
//! and [`SourceStore`] over the application's relational connection. The
//! components in this crate only ever talk to the traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rowlake_schema::{Field, SourceColumn, TableSchema};

use crate::error::WarehouseResult;

/// A result row or insert payload: field name → value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Handle to a submitted query job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion state of a query job.
#[derive(Debug, Clone)]
pub enum QueryState {
    /// Still running; poll again.
    Pending,
    /// Finished; result rows in column order.
    Complete(Vec<Row>),
}

/// Options for a streaming insert batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOptions {
    /// Accept rows that carry fields the table schema does not know.
    pub ignore_unknown_values: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            ignore_unknown_values: true,
        }
    }
}

/// One row of a streaming insert batch.
///
/// `insert_id` equals the row's `id` and is the warehouse-side dedup key:
/// delivery is at-least-once, and the warehouse drops retried rows with an
/// `insert_id` it has already seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRequest {
    /// Dedup key, equal to `data["id"]`.
    pub insert_id: i64,
    /// The row payload.
    pub data: Row,
    /// Struct descriptors for nested fields in `data`, when any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

/// A single error reported by the warehouse for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

/// A row the warehouse rejected, with every error it reported for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRow {
    /// Index of the row within the submitted batch.
    pub index: usize,
    /// Errors reported for this row.
    pub errors: Vec<RowError>,
}

/// Response to a streaming insert batch. Partial failure is normal: rows
/// absent from `failed_rows` were accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertResponse {
    /// Rows the warehouse rejected.
    pub failed_rows: Vec<FailedRow>,
}

impl InsertResponse {
    /// Whether every row was accepted.
    pub fn is_successful(&self) -> bool {
        self.failed_rows.is_empty()
    }
}

/// Capability surface of the analytical warehouse.
#[async_trait]
pub trait WarehouseApi: Send + Sync {
    /// Create a dataset (namespace).
    async fn create_dataset(&self, dataset: &str) -> WarehouseResult<()>;

    /// Delete a dataset.
    async fn delete_dataset(&self, dataset: &str) -> WarehouseResult<()>;

    /// List dataset names.
    async fn list_datasets(&self) -> WarehouseResult<Vec<String>>;

    /// Create a table with the given schema.
    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
    ) -> WarehouseResult<()>;

    /// Delete a table.
    async fn delete_table(&self, dataset: &str, table: &str) -> WarehouseResult<()>;

    /// List table names within a dataset.
    async fn list_tables(&self, dataset: &str) -> WarehouseResult<Vec<String>>;

    /// Submit a query and return a pollable job handle.
    async fn start_query(&self, sql: &str) -> WarehouseResult<JobHandle>;

    /// Check a submitted query's completion state.
    async fn query_status(&self, job: &JobHandle) -> WarehouseResult<QueryState>;

    /// Append a batch of rows to a table.
    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: Vec<InsertRequest>,
        options: &InsertOptions,
    ) -> WarehouseResult<InsertResponse>;
}

/// Capability surface of the relational source store.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// List table names in the source database.
    async fn list_tables(&self) -> WarehouseResult<Vec<String>>;

    /// Describe a table's columns.
    async fn describe(&self, table: &str) -> WarehouseResult<Vec<SourceColumn>>;

    /// Count rows in a table.
    async fn count(&self, table: &str) -> WarehouseResult<usize>;

    /// Fetch a page of rows.
    async fn fetch(&self, table: &str, limit: usize, offset: usize) -> WarehouseResult<Vec<Row>>;
}
