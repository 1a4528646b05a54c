//! In-memory doubles for the warehouse and source-store traits.
//!
//! [`MemoryWarehouse`] keeps datasets, tables and rows in process and
//! answers the limited query shapes the components actually emit: max
//! lookups, ledger selects with where/order/limit, and deletes by exact
//! match. Anything else must be pre-registered with
//! [`MemoryWarehouse::add_canned`]. [`MemorySource`] plays the relational
//! side for replication tests and counts introspection calls.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map as JsonMap, Value as JsonValue};

use rowlake_schema::{SourceColumn, TableSchema};

use crate::client::{
    FailedRow, InsertOptions, InsertRequest, InsertResponse, JobHandle, QueryState, Row,
    SourceStore, WarehouseApi,
};
use crate::error::{WarehouseError, WarehouseResult};

#[derive(Default)]
struct TableData {
    schema: TableSchema,
    rows: Vec<Row>,
}

struct JobRec {
    remaining: u32,
    rows: Vec<Row>,
}

#[derive(Default)]
struct Inner {
    datasets: BTreeMap<String, BTreeMap<String, TableData>>,
    jobs: HashMap<String, JobRec>,
    canned: HashMap<String, Vec<Row>>,
    pending_polls: u32,
    fail_next_insert: Option<Vec<FailedRow>>,
}

/// In-memory [`WarehouseApi`] implementation for tests.
#[derive(Default)]
pub struct MemoryWarehouse {
    inner: Mutex<Inner>,
    next_job: AtomicU64,
}

impl MemoryWarehouse {
    /// Create an empty warehouse.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a warehouse with one dataset already present.
    pub fn with_dataset(name: impl Into<String>) -> Self {
        let warehouse = Self::new();
        warehouse
            .inner
            .lock()
            .datasets
            .insert(name.into(), BTreeMap::new());
        warehouse
    }

    /// Register a fixed result for an exact SQL string.
    pub fn add_canned(&self, sql: impl Into<String>, rows: Vec<Row>) {
        self.inner.lock().canned.insert(sql.into(), rows);
    }

    /// Make every subsequently started query report pending this many
    /// times before completing.
    pub fn set_pending_polls(&self, polls: u32) {
        self.inner.lock().pending_polls = polls;
    }

    /// Make the next insert batch reject the given rows.
    pub fn fail_next_insert(&self, failed: Vec<FailedRow>) {
        self.inner.lock().fail_next_insert = Some(failed);
    }

    /// Create a table without going through the catalog.
    pub fn create_empty_table(&self, dataset: &str, table: &str) {
        self.inner
            .lock()
            .datasets
            .entry(dataset.to_string())
            .or_default()
            .insert(table.to_string(), TableData::default());
    }

    /// Append a row without going through the insert pipeline.
    pub fn push_row(&self, dataset: &str, table: &str, row: Row) {
        let mut inner = self.inner.lock();
        if let Some(data) = inner
            .datasets
            .get_mut(dataset)
            .and_then(|d| d.get_mut(table))
        {
            data.rows.push(row);
        }
    }

    /// Stored rows of a table.
    pub fn rows(&self, dataset: &str, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .datasets
            .get(dataset)
            .and_then(|d| d.get(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Stored schema of a table.
    pub fn table_schema(&self, dataset: &str, table: &str) -> Option<TableSchema> {
        self.inner
            .lock()
            .datasets
            .get(dataset)
            .and_then(|d| d.get(table))
            .map(|t| t.schema.clone())
    }
}

#[async_trait]
impl WarehouseApi for MemoryWarehouse {
    async fn create_dataset(&self, dataset: &str) -> WarehouseResult<()> {
        let mut inner = self.inner.lock();
        if inner.datasets.contains_key(dataset) {
            return Err(WarehouseError::duplicate(format!(
                "dataset {dataset} already exists"
            )));
        }
        inner.datasets.insert(dataset.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_dataset(&self, dataset: &str) -> WarehouseResult<()> {
        self.inner
            .lock()
            .datasets
            .remove(dataset)
            .map(|_| ())
            .ok_or_else(|| WarehouseError::not_found(format!("dataset {dataset}")))
    }

    async fn list_datasets(&self) -> WarehouseResult<Vec<String>> {
        Ok(self.inner.lock().datasets.keys().cloned().collect())
    }

    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
    ) -> WarehouseResult<()> {
        let mut inner = self.inner.lock();
        let tables = inner
            .datasets
            .get_mut(dataset)
            .ok_or_else(|| WarehouseError::not_found(format!("dataset {dataset}")))?;

        if tables.contains_key(table) {
            return Err(WarehouseError::duplicate(format!(
                "table {dataset}.{table} already exists"
            )));
        }
        tables.insert(
            table.to_string(),
            TableData {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_table(&self, dataset: &str, table: &str) -> WarehouseResult<()> {
        self.inner
            .lock()
            .datasets
            .get_mut(dataset)
            .and_then(|d| d.remove(table))
            .map(|_| ())
            .ok_or_else(|| WarehouseError::not_found(format!("table {dataset}.{table}")))
    }

    async fn list_tables(&self, dataset: &str) -> WarehouseResult<Vec<String>> {
        self.inner
            .lock()
            .datasets
            .get(dataset)
            .map(|d| d.keys().cloned().collect())
            .ok_or_else(|| WarehouseError::not_found(format!("dataset {dataset}")))
    }

    async fn start_query(&self, sql: &str) -> WarehouseResult<JobHandle> {
        let mut inner = self.inner.lock();
        let rows = evaluate(&mut inner, sql)?;

        let id = format!("job-{}", self.next_job.fetch_add(1, AtomicOrdering::SeqCst));
        let remaining = inner.pending_polls;
        inner.jobs.insert(id.clone(), JobRec { remaining, rows });
        Ok(JobHandle(id))
    }

    async fn query_status(&self, job: &JobHandle) -> WarehouseResult<QueryState> {
        let mut inner = self.inner.lock();
        let rec = inner
            .jobs
            .get_mut(&job.0)
            .ok_or_else(|| WarehouseError::job(format!("unknown job {job}")))?;

        if rec.remaining > 0 {
            rec.remaining -= 1;
            return Ok(QueryState::Pending);
        }
        Ok(QueryState::Complete(rec.rows.clone()))
    }

    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: Vec<InsertRequest>,
        _options: &InsertOptions,
    ) -> WarehouseResult<InsertResponse> {
        let mut inner = self.inner.lock();
        let failed = inner.fail_next_insert.take().unwrap_or_default();

        let data = inner
            .datasets
            .get_mut(dataset)
            .and_then(|d| d.get_mut(table))
            .ok_or_else(|| WarehouseError::not_found(format!("table {dataset}.{table}")))?;

        for (index, request) in rows.into_iter().enumerate() {
            if failed.iter().any(|f| f.index == index) {
                continue;
            }
            data.rows.push(request.data);
        }

        Ok(InsertResponse { failed_rows: failed })
    }
}

/// Evaluate the limited SQL surface the components emit.
fn evaluate(inner: &mut Inner, sql: &str) -> WarehouseResult<Vec<Row>> {
    let sql = sql.trim();
    if let Some(rows) = inner.canned.get(sql) {
        return Ok(rows.clone());
    }

    let upper = sql.to_uppercase();
    if upper.starts_with("DELETE FROM ") {
        return evaluate_delete(inner, sql);
    }
    if upper.starts_with("SELECT ") {
        return evaluate_select(inner, sql);
    }

    Err(WarehouseError::job(format!("unsupported test query: {sql}")))
}

fn evaluate_delete(inner: &mut Inner, sql: &str) -> WarehouseResult<Vec<Row>> {
    // DELETE FROM ds.table WHERE col = value
    let tokens: Vec<&str> = sql.split_whitespace().collect();
    if tokens.len() != 7 || !tokens[3].eq_ignore_ascii_case("WHERE") || tokens[5] != "=" {
        return Err(WarehouseError::job(format!("unsupported delete: {sql}")));
    }

    let (dataset, table) = split_target(tokens[2])?;
    let column = tokens[4];
    let value = parse_literal(tokens[6]);

    let data = inner
        .datasets
        .get_mut(dataset)
        .and_then(|d| d.get_mut(table))
        .ok_or_else(|| WarehouseError::not_found(format!("table {dataset}.{table}")))?;

    data.rows.retain(|row| row.get(column) != Some(&value));
    Ok(Vec::new())
}

fn evaluate_select(inner: &Inner, sql: &str) -> WarehouseResult<Vec<Row>> {
    let upper = sql.to_uppercase();
    let from_idx = upper
        .find(" FROM ")
        .ok_or_else(|| WarehouseError::job(format!("select without FROM: {sql}")))?;

    let select_list = sql["SELECT ".len()..from_idx].trim();
    let rest = &sql[from_idx + " FROM ".len()..];
    let rest_upper = &upper[from_idx + " FROM ".len()..];

    let where_idx = rest_upper.find(" WHERE ");
    let order_idx = rest_upper.find(" ORDER BY ");
    let limit_idx = rest_upper.find(" LIMIT ");
    let clause_start = [where_idx, order_idx, limit_idx]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());

    let (dataset, table) = split_target(rest[..clause_start].trim())?;
    let mut rows = inner
        .datasets
        .get(dataset)
        .and_then(|d| d.get(table))
        .ok_or_else(|| WarehouseError::not_found(format!("table {dataset}.{table}")))?
        .rows
        .clone();

    if let Some(idx) = where_idx {
        let end = [order_idx, limit_idx]
            .into_iter()
            .flatten()
            .filter(|&i| i > idx)
            .min()
            .unwrap_or(rest.len());
        apply_where(&mut rows, rest[idx + " WHERE ".len()..end].trim())?;
    }

    if let Some(idx) = order_idx {
        let end = limit_idx.filter(|&i| i > idx).unwrap_or(rest.len());
        apply_order(&mut rows, rest[idx + " ORDER BY ".len()..end].trim());
    }

    if let Some(idx) = limit_idx {
        let limit: usize = rest[idx + " LIMIT ".len()..]
            .trim()
            .parse()
            .map_err(|_| WarehouseError::job(format!("bad limit in: {sql}")))?;
        rows.truncate(limit);
    }

    project(rows, select_list)
}

fn split_target(target: &str) -> WarehouseResult<(&str, &str)> {
    let target = target.trim_matches('`');
    target
        .split_once('.')
        .ok_or_else(|| WarehouseError::job(format!("unqualified table: {target}")))
}

fn parse_literal(text: &str) -> JsonValue {
    let trimmed = text.trim();
    if (trimmed.starts_with('\'') && trimmed.ends_with('\''))
        || (trimmed.starts_with('"') && trimmed.ends_with('"'))
    {
        return JsonValue::String(trimmed[1..trimmed.len() - 1].to_string());
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return JsonValue::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        return JsonValue::from(float);
    }
    JsonValue::String(trimmed.to_string())
}

fn apply_where(rows: &mut Vec<Row>, condition: &str) -> WarehouseResult<()> {
    let (column, op, value) = if let Some((col, val)) = condition.split_once(">=") {
        (col.trim(), Ordering::Greater, parse_literal(val))
    } else if let Some((col, val)) = condition.split_once('=') {
        (col.trim(), Ordering::Equal, parse_literal(val))
    } else {
        return Err(WarehouseError::job(format!(
            "unsupported condition: {condition}"
        )));
    };

    rows.retain(|row| {
        let Some(actual) = row.get(column) else {
            return false;
        };
        match op {
            Ordering::Equal => actual == &value,
            // ">=" keeps equal-or-greater values.
            _ => cmp_values(actual, &value) != Ordering::Less,
        }
    });
    Ok(())
}

fn apply_order(rows: &mut [Row], order: &str) {
    let keys: Vec<(&str, bool)> = order
        .split(',')
        .map(|part| {
            let part = part.trim();
            match part.rsplit_once(' ') {
                Some((col, dir)) if dir.eq_ignore_ascii_case("DESC") => (col.trim(), true),
                Some((col, dir)) if dir.eq_ignore_ascii_case("ASC") => (col.trim(), false),
                _ => (part, false),
            }
        })
        .collect();

    // Stable sorts applied from the least significant key up.
    for (column, descending) in keys.iter().rev() {
        rows.sort_by(|a, b| {
            let ord = cmp_values(
                a.get(*column).unwrap_or(&JsonValue::Null),
                b.get(*column).unwrap_or(&JsonValue::Null),
            );
            if *descending { ord.reverse() } else { ord }
        });
    }
}

fn cmp_values(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
        (JsonValue::Null, _) => Ordering::Less,
        (_, JsonValue::Null) => Ordering::Greater,
        (JsonValue::Number(x), JsonValue::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

fn project(rows: Vec<Row>, select_list: &str) -> WarehouseResult<Vec<Row>> {
    if select_list == "*" {
        return Ok(rows);
    }

    if select_list.to_uppercase().starts_with("MAX(") {
        let close = select_list
            .find(')')
            .ok_or_else(|| WarehouseError::job(format!("bad aggregate: {select_list}")))?;
        let column = select_list["MAX(".len()..close].trim();
        let alias = select_list[close + 1..].trim();
        let alias = if alias.is_empty() { column } else { alias };

        let max = rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|v| !v.is_null())
            .max_by(|a, b| cmp_values(a, b))
            .cloned()
            .unwrap_or(JsonValue::Null);

        let mut row = JsonMap::new();
        row.insert(alias.to_string(), max);
        return Ok(vec![row]);
    }

    let columns: Vec<&str> = select_list.split(',').map(str::trim).collect();
    Ok(rows
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .filter_map(|&col| row.get(col).map(|v| (col.to_string(), v.clone())))
                .collect()
        })
        .collect())
}

#[derive(Default)]
struct SourceTable {
    columns: Vec<SourceColumn>,
    rows: Vec<Row>,
}

#[derive(Default)]
struct SourceInner {
    tables: BTreeMap<String, SourceTable>,
    describe_calls: HashMap<String, usize>,
}

/// In-memory [`SourceStore`] implementation for tests.
#[derive(Default)]
pub struct MemorySource {
    inner: Mutex<SourceInner>,
}

impl MemorySource {
    /// Create an empty source store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with its columns and rows.
    pub fn table(
        self,
        name: impl Into<String>,
        columns: Vec<SourceColumn>,
        rows: Vec<Row>,
    ) -> Self {
        self.inner
            .lock()
            .tables
            .insert(name.into(), SourceTable { columns, rows });
        self
    }

    /// How often a table has been introspected.
    pub fn describe_calls(&self, table: &str) -> usize {
        self.inner
            .lock()
            .describe_calls
            .get(table)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn list_tables(&self) -> WarehouseResult<Vec<String>> {
        Ok(self.inner.lock().tables.keys().cloned().collect())
    }

    async fn describe(&self, table: &str) -> WarehouseResult<Vec<SourceColumn>> {
        let mut inner = self.inner.lock();
        *inner.describe_calls.entry(table.to_string()).or_insert(0) += 1;
        inner
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| WarehouseError::source(format!("unknown table {table}")))
    }

    async fn count(&self, table: &str) -> WarehouseResult<usize> {
        self.inner
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .ok_or_else(|| WarehouseError::source(format!("unknown table {table}")))
    }

    async fn fetch(&self, table: &str, limit: usize, offset: usize) -> WarehouseResult<Vec<Row>> {
        let inner = self.inner.lock();
        let rows = &inner
            .tables
            .get(table)
            .ok_or_else(|| WarehouseError::source(format!("unknown table {table}")))?
            .rows;

        Ok(rows.iter().skip(offset).take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().unwrap().clone()
    }

    fn seeded() -> MemoryWarehouse {
        let warehouse = MemoryWarehouse::with_dataset("analytics");
        warehouse.create_empty_table("analytics", "migrations");
        warehouse.push_row(
            "analytics",
            "migrations",
            row(json!({"id": 1, "migration": "create_users", "batch": 1})),
        );
        warehouse.push_row(
            "analytics",
            "migrations",
            row(json!({"id": 2, "migration": "create_orders", "batch": 1})),
        );
        warehouse.push_row(
            "analytics",
            "migrations",
            row(json!({"id": 3, "migration": "add_index", "batch": 2})),
        );
        warehouse
    }

    #[test]
    fn test_evaluate_max() {
        let warehouse = seeded();
        let mut inner = warehouse.inner.lock();
        let rows = evaluate(
            &mut inner,
            "SELECT MAX(batch) batch FROM `analytics.migrations`",
        )
        .unwrap();
        assert_eq!(rows[0]["batch"], 2);
    }

    #[test]
    fn test_evaluate_max_of_empty_is_null() {
        let warehouse = MemoryWarehouse::with_dataset("analytics");
        warehouse.create_empty_table("analytics", "orders");
        let mut inner = warehouse.inner.lock();
        let rows = evaluate(&mut inner, "SELECT MAX(id) id FROM `analytics.orders`").unwrap();
        assert_eq!(rows[0]["id"], JsonValue::Null);
    }

    #[test]
    fn test_evaluate_where_order() {
        let warehouse = seeded();
        let mut inner = warehouse.inner.lock();
        let rows = evaluate(
            &mut inner,
            "SELECT migration, batch FROM analytics.migrations \
             WHERE batch = 1 ORDER BY migration DESC",
        )
        .unwrap();

        let names: Vec<&str> = rows.iter().map(|r| r["migration"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["create_users", "create_orders"]);
        assert!(rows[0].get("id").is_none());
    }

    #[test]
    fn test_evaluate_multi_key_order_and_limit() {
        let warehouse = seeded();
        let mut inner = warehouse.inner.lock();
        let rows = evaluate(
            &mut inner,
            "SELECT migration, batch FROM analytics.migrations \
             WHERE batch >= 1 ORDER BY batch DESC, migration DESC LIMIT 2",
        )
        .unwrap();

        let names: Vec<&str> = rows.iter().map(|r| r["migration"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["add_index", "create_users"]);
    }

    #[test]
    fn test_evaluate_delete() {
        let warehouse = seeded();
        {
            let mut inner = warehouse.inner.lock();
            evaluate(
                &mut inner,
                "DELETE FROM analytics.migrations WHERE migration = 'add_index'",
            )
            .unwrap();
        }

        assert_eq!(warehouse.rows("analytics", "migrations").len(), 2);
    }

    #[test]
    fn test_unsupported_query_errors() {
        let warehouse = MemoryWarehouse::new();
        let mut inner = warehouse.inner.lock();
        assert!(evaluate(&mut inner, "VACUUM").is_err());
    }
}
