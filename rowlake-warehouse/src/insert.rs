//! Streaming insert pipeline.
//!
//! Rows are appended through the warehouse's streaming path: each row
//! carries a client-assigned dedup key (`insert_id`) instead of a
//! transactional commit. Identity assignment reads `max(id)` once per
//! call and counts up from there, which is only safe under a single
//! writer per dataset; nothing here takes a lock to enforce that.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use rowlake_schema::{infer_struct, Field, FieldType};

use crate::client::{FailedRow, InsertOptions, InsertRequest, Row, WarehouseApi};
use crate::config::WarehouseConfig;
use crate::error::WarehouseResult;
use crate::executor::QueryExecutor;

/// Rows per insert chunk. The pipeline submits one chunk per invocation;
/// looping over a larger data set belongs to the caller.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Outcome of one insert batch.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// Every row was accepted.
    Success,
    /// Some rows were rejected; the rest were accepted. Per-row error
    /// detail is preserved.
    PartialFailure(Vec<FailedRow>),
}

impl InsertOutcome {
    /// Whether every row was accepted.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The rejected rows, empty on full success.
    pub fn failed_rows(&self) -> &[FailedRow] {
        match self {
            Self::Success => &[],
            Self::PartialFailure(failed) => failed,
        }
    }
}

/// Converts row batches into streaming insert requests and submits them.
#[derive(Clone)]
pub struct InsertPipeline {
    api: Arc<dyn WarehouseApi>,
    executor: QueryExecutor,
    config: Arc<WarehouseConfig>,
}

impl InsertPipeline {
    /// Create an insert pipeline.
    pub fn new(
        api: Arc<dyn WarehouseApi>,
        executor: QueryExecutor,
        config: Arc<WarehouseConfig>,
    ) -> Self {
        Self {
            api,
            executor,
            config,
        }
    }

    /// Build insert requests from source rows.
    ///
    /// The running id starts at the table's current maximum and advances
    /// once per row; a row without an `id` receives the running value.
    /// Every request's `insert_id` equals its row id, and nested object
    /// fields get an inferred `STRUCT` descriptor.
    pub fn prepare_rows(rows: Vec<Row>, current_max_id: i64) -> Vec<InsertRequest> {
        let mut requests = Vec::with_capacity(rows.len());
        let mut next_id = current_max_id;

        for mut row in rows {
            next_id += 1;

            let fields: Vec<Field> = row
                .iter()
                .filter_map(|(name, value)| match value {
                    JsonValue::Object(nested) => Some(
                        Field::new(name, FieldType::Struct).with_fields(infer_struct(nested)),
                    ),
                    _ => None,
                })
                .collect();

            if !row.contains_key("id") {
                row.insert("id".to_string(), JsonValue::from(next_id));
            }
            let insert_id = row.get("id").and_then(JsonValue::as_i64).unwrap_or(next_id);

            requests.push(InsertRequest {
                insert_id,
                data: row,
                fields,
            });
        }

        requests
    }

    /// Append one batch of rows to a table.
    ///
    /// Partial failure is normal and reported as data, not as an error:
    /// rows absent from the outcome's failure list were accepted.
    pub async fn insert(
        &self,
        table: &str,
        rows: Vec<Row>,
        options: Option<InsertOptions>,
        dataset: Option<&str>,
    ) -> WarehouseResult<InsertOutcome> {
        if rows.is_empty() {
            return Ok(InsertOutcome::Success);
        }
        if rows.len() > self.config.chunk_size {
            warn!(
                table,
                rows = rows.len(),
                chunk_size = self.config.chunk_size,
                "batch exceeds the chunk size; callers should chunk bulk loads"
            );
        }

        let current_max = self.executor.max_id(table, dataset).await?;
        let requests = Self::prepare_rows(rows, current_max);
        debug!(table, rows = requests.len(), current_max, "streaming insert");

        let response = self
            .api
            .insert_rows(
                self.config.dataset(dataset),
                table,
                requests,
                &options.unwrap_or_default(),
            )
            .await?;

        if response.is_successful() {
            Ok(InsertOutcome::Success)
        } else {
            Ok(InsertOutcome::PartialFailure(response.failed_rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RowError;
    use crate::poll::PollPolicy;
    use crate::testing::MemoryWarehouse;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn row(value: JsonValue) -> Row {
        value.as_object().unwrap().clone()
    }

    fn setup() -> (Arc<MemoryWarehouse>, InsertPipeline) {
        let api = Arc::new(MemoryWarehouse::with_dataset("analytics"));
        let config = Arc::new(
            WarehouseConfig::new("acme-project", "analytics")
                .poll(PollPolicy::new().interval(Duration::from_millis(1))),
        );
        let executor = QueryExecutor::new(api.clone(), config.clone());
        let pipeline = InsertPipeline::new(api.clone(), executor, config);
        (api, pipeline)
    }

    #[test]
    fn test_prepare_assigns_increasing_ids() {
        let rows = vec![
            row(json!({"name": "a"})),
            row(json!({"name": "b"})),
            row(json!({"name": "c"})),
        ];

        let requests = InsertPipeline::prepare_rows(rows, 41);
        let ids: Vec<i64> = requests.iter().map(|r| r.insert_id).collect();

        assert_eq!(ids, vec![42, 43, 44]);
        assert_eq!(requests[0].data["id"], 42);
    }

    #[test]
    fn test_prepare_keeps_existing_id() {
        let rows = vec![row(json!({"id": 7, "name": "a"})), row(json!({"name": "b"}))];

        let requests = InsertPipeline::prepare_rows(rows, 10);
        assert_eq!(requests[0].insert_id, 7);
        // The running value still advances for every row.
        assert_eq!(requests[1].insert_id, 12);
    }

    #[test]
    fn test_prepare_infers_struct_fields() {
        let rows = vec![row(json!({
            "name": "a",
            "meta": {"origin": "import", "attempt": 2}
        }))];

        let requests = InsertPipeline::prepare_rows(rows, 0);
        let field = &requests[0].fields[0];

        assert_eq!(field.name, "meta");
        assert_eq!(field.field_type, FieldType::Struct);
        let nested = field.fields.as_ref().unwrap();
        assert!(nested.iter().any(|f| f.name == "origin" && f.field_type == FieldType::String));
        assert!(nested.iter().any(|f| f.name == "attempt" && f.field_type == FieldType::Integer));
    }

    #[tokio::test]
    async fn test_insert_continues_from_table_max() {
        let (api, pipeline) = setup();
        api.create_empty_table("analytics", "events");
        api.push_row("analytics", "events", row(json!({"id": 5, "kind": "seed"})));

        let outcome = pipeline
            .insert(
                "events",
                vec![row(json!({"kind": "x"})), row(json!({"kind": "y"}))],
                None,
                None,
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        let rows = api.rows("analytics", "events");
        let ids: Vec<i64> = rows.iter().filter_map(|r| r["id"].as_i64()).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[tokio::test]
    async fn test_insert_reports_partial_failure() {
        let (api, pipeline) = setup();
        api.create_empty_table("analytics", "events");
        api.fail_next_insert(vec![FailedRow {
            index: 1,
            errors: vec![RowError {
                reason: "invalid".to_string(),
                message: "bad field".to_string(),
            }],
        }]);

        let outcome = pipeline
            .insert(
                "events",
                vec![row(json!({"kind": "x"})), row(json!({"kind": "y"}))],
                None,
                None,
            )
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.failed_rows()[0].index, 1);
        // The accepted row landed; the rejected one did not.
        assert_eq!(api.rows("analytics", "events").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let (_api, pipeline) = setup();
        let outcome = pipeline.insert("events", vec![], None, None).await.unwrap();
        assert!(outcome.is_success());
    }
}
