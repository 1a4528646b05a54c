//! Query submission, bounded completion polling, and result reshaping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::client::{QueryState, Row, WarehouseApi};
use crate::config::WarehouseConfig;
use crate::error::{WarehouseError, WarehouseResult};
use crate::sql::{QuerySource, Translator};

/// Eager-load reshape specification.
///
/// A "with" query flattens a one-to-many join into one result set; this
/// spec carries what the executor needs to fold it back: the owner and
/// related key columns (`uids`) and the selected fields per entry. An
/// entry key of the form `"orders->o"` selects from `orders` and groups
/// its fields under alias `o`; a plain key selects owner-level fields.
/// A field may rename itself with `"total as order_total"`.
#[derive(Debug, Clone)]
pub struct SelectWith {
    owner_key: String,
    related_key: String,
    entries: Vec<WithEntry>,
}

#[derive(Debug, Clone)]
struct WithEntry {
    key: String,
    fields: Vec<String>,
}

impl SelectWith {
    /// Create a reshape spec with the owner and related key columns.
    pub fn new(owner_key: impl Into<String>, related_key: impl Into<String>) -> Self {
        Self {
            owner_key: owner_key.into(),
            related_key: related_key.into(),
            entries: Vec::new(),
        }
    }

    /// Add an entry: a table (optionally `"table->alias"`) and its
    /// selected fields.
    pub fn with<I, S>(mut self, key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push(WithEntry {
            key: key.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// The qualified select column list for the relational builder.
    pub fn select_columns(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|entry| {
                let table = entry.key.split("->").next().unwrap_or(&entry.key);
                entry
                    .fields
                    .iter()
                    .map(move |field| format!("{}.{}", table, field))
            })
            .collect()
    }

    /// Result column name → grouping alias ("" for owner-level fields).
    pub fn aliases(&self) -> IndexMap<String, String> {
        let mut aliases = IndexMap::new();

        for entry in &self.entries {
            let alias = entry.key.split_once("->").map(|(_, a)| a).unwrap_or("");
            for field in &entry.fields {
                let name = field
                    .split_once(" as ")
                    .map(|(_, renamed)| renamed)
                    .unwrap_or(field);
                aliases.insert(name.to_string(), alias.to_string());
            }
        }

        aliases
    }

    /// Fold flat result rows into the grouped structure
    /// `{owner_id: {alias_or_field: {related_id: {...}}}}`.
    pub fn reshape(&self, rows: &[Row]) -> JsonValue {
        let aliases = self.aliases();
        let mut out = JsonMap::new();

        for row in rows {
            let Some(owner) = key_string(row.get(&self.owner_key)) else {
                debug!(owner_key = %self.owner_key, "row missing owner key, skipping");
                continue;
            };

            let entry = out
                .entry(owner)
                .or_insert_with(|| JsonValue::Object(JsonMap::new()));

            for (column, value) in row {
                let alias = aliases.get(column).map(String::as_str).unwrap_or("");
                if alias.is_empty() {
                    entry[column.as_str()] = value.clone();
                } else if let Some(related) = key_string(row.get(&self.related_key)) {
                    entry[alias][related.as_str()][column.as_str()] = value.clone();
                }
            }
        }

        JsonValue::Object(out)
    }
}

/// Render a key column value as a JSON object key.
fn key_string(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

/// Executes translated SQL against the warehouse.
#[derive(Clone)]
pub struct QueryExecutor {
    api: Arc<dyn WarehouseApi>,
    config: Arc<WarehouseConfig>,
    translator: Translator,
}

impl QueryExecutor {
    /// Create an executor. The translator targets the configured default
    /// dataset.
    pub fn new(api: Arc<dyn WarehouseApi>, config: Arc<WarehouseConfig>) -> Self {
        let translator = Translator::new(config.default_dataset.clone());
        Self {
            api,
            config,
            translator,
        }
    }

    /// The dialect translator in use.
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Submit SQL and poll until complete, bounded by the poll policy.
    pub async fn run(&self, sql: &str) -> WarehouseResult<Vec<Row>> {
        debug!(sql, "submitting query");
        let job = self.api.start_query(sql).await?;
        let poll = &self.config.poll;

        for attempt in 1..=poll.max_attempts {
            match self.api.query_status(&job).await? {
                QueryState::Complete(rows) => {
                    debug!(job = %job, rows = rows.len(), "query complete");
                    return Ok(rows);
                }
                QueryState::Pending => {
                    if attempt < poll.max_attempts {
                        tokio::time::sleep(poll.pause()).await;
                    }
                }
            }
        }

        Err(WarehouseError::Timeout {
            handle: job.to_string(),
            attempts: poll.max_attempts,
        })
    }

    /// Translate and run a query, returning rows in order.
    pub async fn get(&self, source: impl Into<QuerySource>) -> WarehouseResult<Vec<Row>> {
        let source = source.into();
        self.run(&self.translator.translate(&source)).await
    }

    /// Translate and run a query, folding the flat rows through the
    /// reshape spec.
    pub async fn get_grouped(
        &self,
        source: impl Into<QuerySource>,
        with: &SelectWith,
    ) -> WarehouseResult<JsonValue> {
        let rows = self.get(source).await?;
        Ok(with.reshape(&rows))
    }

    /// Run a statement for its effect, discarding any rows.
    pub async fn execute(&self, sql: &str) -> WarehouseResult<()> {
        self.run(sql).await.map(|_| ())
    }

    /// Current maximum `id` in a table; 0 when the table is empty.
    pub async fn max_id(&self, table: &str, dataset: Option<&str>) -> WarehouseResult<i64> {
        let value = self.max_of_field(table, "id", dataset).await?;
        Ok(value.and_then(|v| v.as_i64()).unwrap_or(0))
    }

    /// Maximum of an arbitrary field; `None` when the table is empty.
    pub async fn max_of_field(
        &self,
        table: &str,
        field: &str,
        dataset: Option<&str>,
    ) -> WarehouseResult<Option<JsonValue>> {
        let dataset = self.config.dataset(dataset);
        let sql = format!("SELECT MAX({field}) {field} FROM `{dataset}.{table}`");

        let rows = self.run(&sql).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(field))
            .filter(|value| !value.is_null()))
    }

    /// Maximum `created_at` timestamp; `None` when the table is empty.
    pub async fn max_created_at(
        &self,
        table: &str,
        dataset: Option<&str>,
    ) -> WarehouseResult<Option<DateTime<Utc>>> {
        match self.max_of_field(table, "created_at", dataset).await? {
            Some(JsonValue::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| WarehouseError::job(format!("unparseable created_at '{s}': {e}"))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::PollPolicy;
    use crate::sql::QueryDescriptor;
    use crate::testing::MemoryWarehouse;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn row(value: JsonValue) -> Row {
        value.as_object().unwrap().clone()
    }

    fn setup(max_attempts: u32) -> (Arc<MemoryWarehouse>, QueryExecutor) {
        let api = Arc::new(MemoryWarehouse::new());
        let config = Arc::new(WarehouseConfig::new("acme-project", "analytics").poll(
            PollPolicy::new()
                .interval(Duration::from_millis(1))
                .max_attempts(max_attempts),
        ));
        let executor = QueryExecutor::new(api.clone(), config);
        (api, executor)
    }

    #[tokio::test]
    async fn test_run_polls_until_complete() {
        let (api, executor) = setup(5);
        api.add_canned("SELECT 1", vec![row(json!({"x": 1}))]);
        api.set_pending_polls(3);

        let rows = executor.run("SELECT 1").await.unwrap();
        assert_eq!(rows[0]["x"], 1);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let (api, executor) = setup(2);
        api.add_canned("SELECT 1", vec![]);
        api.set_pending_polls(10);

        let err = executor.run("SELECT 1").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_get_translates_builder_output() {
        let (api, executor) = setup(5);
        api.add_canned(
            "SELECT * FROM analytics.orders WHERE id = 5",
            vec![row(json!({"id": 5, "total": 9.5}))],
        );

        let query = QueryDescriptor::new("orders", "SELECT * FROM orders WHERE id = ?").bind(5);
        let rows = executor.get(query).await.unwrap();
        assert_eq!(rows[0]["total"], 9.5);
    }

    #[tokio::test]
    async fn test_max_id_defaults_to_zero() {
        let (api, executor) = setup(5);
        api.add_canned(
            "SELECT MAX(id) id FROM `analytics.orders`",
            vec![row(json!({"id": null}))],
        );

        assert_eq!(executor.max_id("orders", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_max_created_at_parses_timestamp() {
        let (api, executor) = setup(5);
        api.add_canned(
            "SELECT MAX(created_at) created_at FROM `analytics.orders`",
            vec![row(json!({"created_at": "2024-03-01T10:30:00+00:00"}))],
        );

        let max = executor.max_created_at("orders", None).await.unwrap();
        assert_eq!(max.unwrap().to_rfc3339(), "2024-03-01T10:30:00+00:00");
    }

    #[tokio::test]
    async fn test_get_grouped_reshapes_query_results() {
        let (api, executor) = setup(5);
        api.add_canned(
            "SELECT users.user_id, orders.order_id, orders.total \
             FROM analytics.users",
            vec![
                row(json!({"user_id": 1, "order_id": 10, "total": 5.0})),
                row(json!({"user_id": 1, "order_id": 11, "total": 2.5})),
            ],
        );

        let with = SelectWith::new("user_id", "order_id")
            .with("users", ["user_id"])
            .with("orders->orders", ["order_id", "total"]);
        let sql = format!(
            "SELECT {} FROM analytics.users",
            with.select_columns().join(", ")
        );

        let grouped = executor.get_grouped(sql, &with).await.unwrap();
        assert_eq!(grouped["1"]["orders"]["10"]["total"], 5.0);
        assert_eq!(grouped["1"]["orders"]["11"]["total"], 2.5);
    }

    #[test]
    fn test_select_columns_and_aliases() {
        let with = SelectWith::new("user_id", "order_id")
            .with("users", ["user_id", "name"])
            .with("orders->orders", ["order_id", "total as order_total"]);

        assert_eq!(
            with.select_columns(),
            vec![
                "users.user_id",
                "users.name",
                "orders.order_id",
                "orders.total as order_total"
            ]
        );

        let aliases = with.aliases();
        assert_eq!(aliases["name"], "");
        assert_eq!(aliases["order_total"], "orders");
    }

    #[test]
    fn test_reshape_groups_one_to_many() {
        let with = SelectWith::new("user_id", "order_id")
            .with("users", ["user_id", "name"])
            .with("orders->orders", ["order_id", "total"]);

        let rows = vec![
            row(json!({"user_id": 1, "name": "ada", "order_id": 10, "total": 5.0})),
            row(json!({"user_id": 1, "name": "ada", "order_id": 11, "total": 7.5})),
            row(json!({"user_id": 2, "name": "kay", "order_id": 12, "total": 1.0})),
        ];

        let grouped = with.reshape(&rows);

        assert_eq!(grouped["1"]["name"], "ada");
        assert_eq!(grouped["1"]["orders"]["10"]["total"], 5.0);
        assert_eq!(grouped["1"]["orders"]["11"]["total"], 7.5);
        assert_eq!(grouped["2"]["orders"]["12"]["total"], 1.0);
        assert!(grouped["2"]["orders"].get("10").is_none());
    }

    #[test]
    fn test_reshape_without_entries_passes_owner_fields() {
        let with = SelectWith::new("id", "other_id");
        let rows = vec![row(json!({"id": 1, "value": "x"}))];

        let grouped = with.reshape(&rows);
        assert_eq!(grouped["1"]["value"], "x");
    }
}
