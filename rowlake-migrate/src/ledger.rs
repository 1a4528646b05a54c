//! The migration ledger.
//!
//! Durable migration state lives in a warehouse table, not in the
//! relational store: `migrations {migration STRING REQUIRED, batch
//! INTEGER}` plus the implicit `id`. Entries are only ever inserted
//! (forward) or deleted (rollback), never updated, and ledger writes go
//! through the same streaming insert path as ordinary data. The table's
//! shape is durable cross-run state; changing it breaks every ledger
//! query against existing deployments.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use rowlake_schema::{Field, FieldType};
use rowlake_warehouse::{
    Catalog, InsertOutcome, InsertPipeline, QueryExecutor, Row, WarehouseConfig, WarehouseError,
};

use crate::error::{MigrateError, MigrateResult};

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "migrations";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration name.
    pub migration: String,
    /// Batch the migration was applied in.
    pub batch: i64,
}

/// What [`Ledger::ensure_ready`] had to create.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerBootstrap {
    /// The default dataset was created.
    pub dataset_created: bool,
    /// The ledger table was created.
    pub table_created: bool,
}

/// Repository over the warehouse-resident `migrations` table.
///
/// Batch numbers are computed as `max(batch) + 1` with no lock; exactly
/// one runner is assumed to act on a dataset at a time.
#[derive(Clone)]
pub struct Ledger {
    catalog: Catalog,
    executor: QueryExecutor,
    pipeline: InsertPipeline,
    config: Arc<WarehouseConfig>,
}

impl Ledger {
    /// Create a ledger over the given warehouse components.
    pub fn new(
        catalog: Catalog,
        executor: QueryExecutor,
        pipeline: InsertPipeline,
        config: Arc<WarehouseConfig>,
    ) -> Self {
        Self {
            catalog,
            executor,
            pipeline,
            config,
        }
    }

    fn dataset(&self) -> &str {
        &self.config.default_dataset
    }

    /// Create the default dataset and the ledger table when missing.
    pub async fn ensure_ready(&self) -> MigrateResult<LedgerBootstrap> {
        let mut bootstrap = LedgerBootstrap::default();

        if !self.catalog.dataset_exists(None).await? {
            self.catalog.create_dataset(None).await?;
            bootstrap.dataset_created = true;
        }

        let tables = self.catalog.list_tables(None).await?;
        if !tables.iter().any(|t| t == LEDGER_TABLE) {
            self.catalog
                .create_table(
                    LEDGER_TABLE,
                    vec![
                        Field::new("migration", FieldType::String).required(),
                        Field::new("batch", FieldType::Integer),
                    ],
                    None,
                )
                .await?;
            bootstrap.table_created = true;
            info!(dataset = self.dataset(), "migration ledger created");
        }

        Ok(bootstrap)
    }

    /// Names of applied migrations, ordered by (migration asc, batch asc).
    pub async fn get_applied(&self) -> MigrateResult<Vec<String>> {
        let sql = format!(
            "SELECT migration, batch FROM {}.{} ORDER BY migration ASC, batch ASC",
            self.dataset(),
            LEDGER_TABLE
        );

        let rows = self.executor.run(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("migration").and_then(JsonValue::as_str))
            .map(String::from)
            .collect())
    }

    /// The highest batch number, 0 when the ledger is empty.
    pub async fn last_batch_number(&self) -> MigrateResult<i64> {
        let sql = format!(
            "SELECT MAX(batch) batch FROM {}.{}",
            self.dataset(),
            LEDGER_TABLE
        );

        let rows = self.executor.run(&sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("batch"))
            .and_then(JsonValue::as_i64)
            .unwrap_or(0))
    }

    /// The batch number the next run will use.
    pub async fn next_batch_number(&self) -> MigrateResult<i64> {
        Ok(self.last_batch_number().await? + 1)
    }

    /// Entries of the most recent batch, ordered migration desc (reverse
    /// application order).
    pub async fn last_batch_entries(&self) -> MigrateResult<Vec<LedgerEntry>> {
        let last = self.last_batch_number().await?;
        if last == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT migration, batch FROM {}.{} WHERE batch = {} ORDER BY migration DESC",
            self.dataset(),
            LEDGER_TABLE,
            last
        );

        self.decode(self.executor.run(&sql).await?)
    }

    /// The `steps` most recently applied entries across batches, ordered
    /// (batch desc, migration desc).
    pub async fn entries_for_steps(&self, steps: usize) -> MigrateResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT migration, batch FROM {}.{} WHERE batch >= 1 \
             ORDER BY batch DESC, migration DESC LIMIT {}",
            self.dataset(),
            LEDGER_TABLE,
            steps
        );

        self.decode(self.executor.run(&sql).await?)
    }

    /// Record an applied migration. Goes through the streaming insert
    /// pipeline, so the entry receives an id like any other row.
    pub async fn record(&self, name: &str, batch: i64) -> MigrateResult<()> {
        debug!(migration = name, batch, "recording ledger entry");

        let mut row = Row::new();
        row.insert("migration".to_string(), JsonValue::from(name));
        row.insert("batch".to_string(), JsonValue::from(batch));

        match self.pipeline.insert(LEDGER_TABLE, vec![row], None, None).await? {
            InsertOutcome::Success => Ok(()),
            InsertOutcome::PartialFailure(failed) => Err(MigrateError::ledger(format!(
                "failed to record '{name}': {failed:?}"
            ))),
        }
    }

    /// Delete a migration's entry by exact name.
    pub async fn remove(&self, name: &str) -> MigrateResult<()> {
        debug!(migration = name, "removing ledger entry");

        let sql = format!(
            "DELETE FROM {}.{} WHERE migration = '{}'",
            self.dataset(),
            LEDGER_TABLE,
            name
        );
        self.executor.execute(&sql).await?;
        Ok(())
    }

    fn decode(&self, rows: Vec<Row>) -> MigrateResult<Vec<LedgerEntry>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(JsonValue::Object(row))
                    .map_err(WarehouseError::from)
                    .map_err(MigrateError::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowlake_warehouse::testing::MemoryWarehouse;
    use rowlake_warehouse::PollPolicy;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryWarehouse>, Ledger) {
        let api = Arc::new(MemoryWarehouse::new());
        let config = Arc::new(
            WarehouseConfig::new("acme-project", "analytics")
                .poll(PollPolicy::new().interval(Duration::from_millis(1))),
        );
        let catalog = Catalog::new(api.clone(), config.clone());
        let executor = QueryExecutor::new(api.clone(), config.clone());
        let pipeline = InsertPipeline::new(api.clone(), executor.clone(), config.clone());
        let ledger = Ledger::new(catalog, executor, pipeline, config);
        (api, ledger)
    }

    #[tokio::test]
    async fn test_ensure_ready_bootstraps_once() {
        let (api, ledger) = setup();

        let first = ledger.ensure_ready().await.unwrap();
        assert!(first.dataset_created);
        assert!(first.table_created);

        let schema = api.table_schema("analytics", LEDGER_TABLE).unwrap();
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "migration", "batch"]);

        let second = ledger.ensure_ready().await.unwrap();
        assert!(!second.dataset_created);
        assert!(!second.table_created);
    }

    #[tokio::test]
    async fn test_empty_ledger_defaults() {
        let (_api, ledger) = setup();
        ledger.ensure_ready().await.unwrap();

        assert_eq!(ledger.last_batch_number().await.unwrap(), 0);
        assert_eq!(ledger.next_batch_number().await.unwrap(), 1);
        assert!(ledger.get_applied().await.unwrap().is_empty());
        assert!(ledger.last_batch_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_assigns_ledger_row_ids() {
        let (api, ledger) = setup();
        ledger.ensure_ready().await.unwrap();

        ledger.record("create_users", 1).await.unwrap();
        ledger.record("create_orders", 1).await.unwrap();

        let rows = api.rows("analytics", LEDGER_TABLE);
        let ids: Vec<i64> = rows.iter().filter_map(|r| r["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_applied_names_are_ordered() {
        let (_api, ledger) = setup();
        ledger.ensure_ready().await.unwrap();

        ledger.record("b_second", 1).await.unwrap();
        ledger.record("a_first", 1).await.unwrap();

        assert_eq!(
            ledger.get_applied().await.unwrap(),
            vec!["a_first", "b_second"]
        );
    }

    #[tokio::test]
    async fn test_last_batch_entries_reverse_order() {
        let (_api, ledger) = setup();
        ledger.ensure_ready().await.unwrap();

        ledger.record("create_users", 1).await.unwrap();
        ledger.record("create_orders", 2).await.unwrap();
        ledger.record("add_index", 2).await.unwrap();

        let entries = ledger.last_batch_entries().await.unwrap();
        assert_eq!(
            entries,
            vec![
                LedgerEntry {
                    migration: "create_orders".to_string(),
                    batch: 2
                },
                LedgerEntry {
                    migration: "add_index".to_string(),
                    batch: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_entries_for_steps_spans_batches() {
        let (_api, ledger) = setup();
        ledger.ensure_ready().await.unwrap();

        ledger.record("create_users", 1).await.unwrap();
        ledger.record("create_orders", 1).await.unwrap();
        ledger.record("add_index", 2).await.unwrap();

        let entries = ledger.entries_for_steps(2).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.migration.as_str()).collect();
        assert_eq!(names, vec!["add_index", "create_users"]);
    }

    #[tokio::test]
    async fn test_remove_deletes_by_exact_name() {
        let (api, ledger) = setup();
        ledger.ensure_ready().await.unwrap();

        ledger.record("create_users", 1).await.unwrap();
        ledger.record("create_orders", 1).await.unwrap();

        ledger.remove("create_users").await.unwrap();

        let rows = api.rows("analytics", LEDGER_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["migration"], "create_orders");
    }
}
