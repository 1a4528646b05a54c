//! The migration contract and its execution contexts.
//!
//! A migration is a named pair of `up`/`down` operations running against
//! an explicit [`MigrationOps`] context. The live context executes
//! against the warehouse; the pretend context records what would have
//! happened, which is how dry runs surface intended SQL without mutating
//! anything.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use rowlake_schema::{Field, TableSchema};
use rowlake_warehouse::{Catalog, InsertOutcome, InsertPipeline, QueryExecutor, Row};

use crate::error::{MigrateError, MigrateResult};

/// A single migration definition.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique migration name; names also define application order.
    fn name(&self) -> &str;

    /// Whether the run is recorded in the ledger. Opting out keeps a
    /// migration invisible to rollback.
    fn log(&self) -> bool {
        true
    }

    /// Apply the migration.
    async fn up(&self, ops: &dyn MigrationOps) -> MigrateResult<()>;

    /// Reverse the migration.
    async fn down(&self, ops: &dyn MigrationOps) -> MigrateResult<()>;
}

/// The warehouse surface migrations run against.
#[async_trait]
pub trait MigrationOps: Send + Sync {
    /// Create a dataset; `None` targets the default dataset.
    async fn create_dataset(&self, dataset: Option<&str>) -> MigrateResult<()>;

    /// Create a table (the implicit id column is prepended).
    async fn create_table(
        &self,
        table: &str,
        fields: Vec<Field>,
        dataset: Option<&str>,
    ) -> MigrateResult<()>;

    /// Delete a table.
    async fn delete_table(&self, table: &str, dataset: Option<&str>) -> MigrateResult<()>;

    /// Run a raw statement for its effect.
    async fn execute(&self, sql: &str) -> MigrateResult<()>;

    /// Stream rows into a table.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> MigrateResult<InsertOutcome>;
}

/// [`MigrationOps`] that executes against the warehouse.
#[derive(Clone)]
pub struct LiveOps {
    catalog: Catalog,
    executor: QueryExecutor,
    pipeline: InsertPipeline,
}

impl LiveOps {
    /// Create a live context from the warehouse components.
    pub fn new(catalog: Catalog, executor: QueryExecutor, pipeline: InsertPipeline) -> Self {
        Self {
            catalog,
            executor,
            pipeline,
        }
    }
}

#[async_trait]
impl MigrationOps for LiveOps {
    async fn create_dataset(&self, dataset: Option<&str>) -> MigrateResult<()> {
        self.catalog.create_dataset(dataset).await?;
        Ok(())
    }

    async fn create_table(
        &self,
        table: &str,
        fields: Vec<Field>,
        dataset: Option<&str>,
    ) -> MigrateResult<()> {
        self.catalog.create_table(table, fields, dataset).await?;
        Ok(())
    }

    async fn delete_table(&self, table: &str, dataset: Option<&str>) -> MigrateResult<()> {
        self.catalog.delete_table(table, dataset).await?;
        Ok(())
    }

    async fn execute(&self, sql: &str) -> MigrateResult<()> {
        self.executor.execute(sql).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> MigrateResult<InsertOutcome> {
        Ok(self.pipeline.insert(table, rows, None, None).await?)
    }
}

/// [`MigrationOps`] that records intended operations without executing
/// them. Used for pretend runs.
pub struct PretendOps {
    dataset: String,
    notes: Mutex<Vec<String>>,
}

impl PretendOps {
    /// Create a recorder resolving unqualified names against a dataset.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            notes: Mutex::new(Vec::new()),
        }
    }

    /// Drain the recorded operations.
    pub fn take_notes(&self) -> Vec<String> {
        std::mem::take(&mut *self.notes.lock())
    }

    fn dataset<'a>(&'a self, dataset: Option<&'a str>) -> &'a str {
        dataset.unwrap_or(&self.dataset)
    }

    fn note(&self, text: String) {
        self.notes.lock().push(text);
    }
}

#[async_trait]
impl MigrationOps for PretendOps {
    async fn create_dataset(&self, dataset: Option<&str>) -> MigrateResult<()> {
        self.note(format!("CREATE DATASET {}", self.dataset(dataset)));
        Ok(())
    }

    async fn create_table(
        &self,
        table: &str,
        fields: Vec<Field>,
        dataset: Option<&str>,
    ) -> MigrateResult<()> {
        // Render what the live path would create, implicit id included.
        let schema = TableSchema::with_implicit_id(fields);
        let columns: Vec<String> = schema
            .fields
            .iter()
            .map(|f| format!("{} {} {}", f.name, f.field_type, f.mode.as_str()))
            .collect();

        self.note(format!(
            "CREATE TABLE {}.{} ({})",
            self.dataset(dataset),
            table,
            columns.join(", ")
        ));
        Ok(())
    }

    async fn delete_table(&self, table: &str, dataset: Option<&str>) -> MigrateResult<()> {
        self.note(format!("DROP TABLE {}.{}", self.dataset(dataset), table));
        Ok(())
    }

    async fn execute(&self, sql: &str) -> MigrateResult<()> {
        self.note(sql.to_string());
        Ok(())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> MigrateResult<InsertOutcome> {
        self.note(format!(
            "INSERT {} row(s) INTO {}.{}",
            rows.len(),
            self.dataset,
            table
        ));
        Ok(InsertOutcome::Success)
    }
}

/// An ordered registry of migration definitions.
///
/// The Rust analogue of the original's migration search paths: whatever
/// discovers definitions registers them here, and the runner sees them
/// in name order. Name uniqueness is enforced on registration.
#[derive(Default)]
pub struct MigrationSet {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration; rejects duplicate names.
    pub fn register(&mut self, migration: Arc<dyn Migration>) -> MigrateResult<()> {
        if self.get(migration.name()).is_some() {
            return Err(MigrateError::DuplicateName(migration.name().to_string()));
        }
        self.migrations.push(migration);
        Ok(())
    }

    /// Look up a migration by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.iter().find(|m| m.name() == name).cloned()
    }

    /// All migrations, sorted by name.
    pub fn in_name_order(&self) -> Vec<Arc<dyn Migration>> {
        let mut ordered = self.migrations.clone();
        ordered.sort_by(|a, b| a.name().cmp(b.name()));
        ordered
    }

    /// All names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.in_name_order()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Number of registered migrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
