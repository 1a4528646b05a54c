//! Bulk data replication from the relational source.
//!
//! Copies every source table that also exists in the warehouse, paging
//! through the source in chunks. Chunks run sequentially on purpose:
//! each insert seeds its ids from the table's current maximum, so a
//! parallel chunk would race the id assignment.

use std::sync::Arc;

use tracing::{debug, info};

use rowlake_warehouse::{
    Catalog, FailedRow, InsertOutcome, InsertPipeline, QueryExecutor, SourceStore, WarehouseApi,
    WarehouseConfig,
};

use crate::error::MigrateResult;

/// Outcome of replicating one table.
#[derive(Debug, Clone)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// Rows the warehouse accepted.
    pub copied: usize,
    /// Rows the warehouse rejected, with per-row error detail.
    pub failed_rows: Vec<FailedRow>,
}

impl TableReport {
    /// Whether every row was accepted.
    pub fn is_complete(&self) -> bool {
        self.failed_rows.is_empty()
    }
}

/// Copies source tables into their warehouse counterparts.
pub struct Replicator {
    source: Arc<dyn SourceStore>,
    catalog: Catalog,
    pipeline: InsertPipeline,
    config: Arc<WarehouseConfig>,
}

impl Replicator {
    /// Create a replicator over a source store and a warehouse client.
    pub fn new(
        source: Arc<dyn SourceStore>,
        api: Arc<dyn WarehouseApi>,
        config: Arc<WarehouseConfig>,
    ) -> Self {
        let catalog = Catalog::new(api.clone(), config.clone());
        let executor = QueryExecutor::new(api.clone(), config.clone());
        let pipeline = InsertPipeline::new(api, executor, config.clone());

        Self {
            source,
            catalog,
            pipeline,
            config,
        }
    }

    /// Replicate every source table that exists in the warehouse.
    pub async fn replicate_all(&self) -> MigrateResult<Vec<TableReport>> {
        let warehouse_tables = self.catalog.list_tables(None).await?;
        let mut reports = Vec::new();

        for table in self.source.list_tables().await? {
            if !warehouse_tables.contains(&table) {
                debug!(table, "skipping table absent from the warehouse");
                continue;
            }
            reports.push(self.replicate_table(&table).await?);
        }

        Ok(reports)
    }

    /// Replicate one table, paging the source in sequential chunks.
    pub async fn replicate_table(&self, table: &str) -> MigrateResult<TableReport> {
        let total = self.source.count(table).await?;
        let chunk_size = self.config.chunk_size.max(1);

        let mut copied = 0;
        let mut failed_rows = Vec::new();
        let mut offset = 0;

        while offset < total {
            let rows = self.source.fetch(table, chunk_size, offset).await?;
            if rows.is_empty() {
                break;
            }
            let fetched = rows.len();
            debug!(table, offset, fetched, "replicating chunk");

            match self.pipeline.insert(table, rows, None, None).await? {
                InsertOutcome::Success => copied += fetched,
                InsertOutcome::PartialFailure(failed) => {
                    copied += fetched - failed.len();
                    failed_rows.extend(failed);
                }
            }

            offset += chunk_size;
        }

        info!(table, copied, failures = failed_rows.len(), "table replicated");
        Ok(TableReport {
            table: table.to_string(),
            copied,
            failed_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowlake_warehouse::testing::{MemorySource, MemoryWarehouse};
    use rowlake_warehouse::{PollPolicy, Row};
    use serde_json::json;
    use std::time::Duration;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn setup(chunk_size: usize, source: MemorySource) -> (Arc<MemoryWarehouse>, Replicator) {
        let api = Arc::new(MemoryWarehouse::with_dataset("analytics"));
        let config = Arc::new(
            WarehouseConfig::new("acme-project", "analytics")
                .poll(PollPolicy::new().interval(Duration::from_millis(1)))
                .chunk_size(chunk_size),
        );
        let replicator = Replicator::new(Arc::new(source), api.clone(), config);
        (api, replicator)
    }

    #[tokio::test]
    async fn test_replicates_in_chunks_with_continuous_ids() {
        let rows: Vec<Row> = (0..5).map(|i| row(json!({"name": format!("u{i}")}))).collect();
        let source = MemorySource::new().table("users", vec![], rows);

        let (api, replicator) = setup(2, source);
        api.create_empty_table("analytics", "users");

        let report = replicator.replicate_table("users").await.unwrap();

        assert_eq!(report.copied, 5);
        assert!(report.is_complete());

        let ids: Vec<i64> = api
            .rows("analytics", "users")
            .iter()
            .filter_map(|r| r["id"].as_i64())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_replicate_all_skips_missing_warehouse_tables() {
        let source = MemorySource::new()
            .table("users", vec![], vec![row(json!({"name": "ada"}))])
            .table("sessions", vec![], vec![row(json!({"token": "x"}))]);

        let (api, replicator) = setup(100, source);
        api.create_empty_table("analytics", "users");

        let reports = replicator.replicate_all().await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].table, "users");
        assert!(api.rows("analytics", "sessions").is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_table_copies_nothing() {
        let source = MemorySource::new().table("users", vec![], vec![]);
        let (api, replicator) = setup(100, source);
        api.create_empty_table("analytics", "users");

        let report = replicator.replicate_table("users").await.unwrap();
        assert_eq!(report.copied, 0);
        assert!(api.rows("analytics", "users").is_empty());
    }
}
