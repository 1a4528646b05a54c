//! Dataset and table lifecycle.

use std::sync::Arc;

use tracing::{debug, info};

use rowlake_schema::{map_columns, CachedMapper, Field, StructHints, TableSchema};

use crate::client::{SourceStore, WarehouseApi};
use crate::config::WarehouseConfig;
use crate::error::{WarehouseError, WarehouseResult};

/// Catalog manager for warehouse datasets and tables.
///
/// Every created table gains a leading `id INTEGER REQUIRED` column
/// unless the caller already defines `id`. `create_table` is not
/// idempotent: creating an existing table surfaces the remote
/// already-exists rejection, and callers needing idempotence check
/// `list_tables` first.
#[derive(Clone)]
pub struct Catalog {
    api: Arc<dyn WarehouseApi>,
    config: Arc<WarehouseConfig>,
}

impl Catalog {
    /// Create a catalog manager.
    pub fn new(api: Arc<dyn WarehouseApi>, config: Arc<WarehouseConfig>) -> Self {
        Self { api, config }
    }

    /// Create a dataset; `None` targets the default dataset.
    pub async fn create_dataset(&self, dataset: Option<&str>) -> WarehouseResult<String> {
        let name = self.config.dataset(dataset);
        info!(dataset = name, "creating dataset");
        self.api.create_dataset(name).await?;
        Ok(name.to_string())
    }

    /// Delete a dataset.
    pub async fn delete_dataset(&self, dataset: Option<&str>) -> WarehouseResult<()> {
        let name = self.config.dataset(dataset);
        info!(dataset = name, "deleting dataset");
        self.api.delete_dataset(name).await
    }

    /// Whether a dataset exists.
    pub async fn dataset_exists(&self, dataset: Option<&str>) -> WarehouseResult<bool> {
        let name = self.config.dataset(dataset);
        Ok(self.list_datasets().await?.iter().any(|d| d == name))
    }

    /// List dataset names.
    pub async fn list_datasets(&self) -> WarehouseResult<Vec<String>> {
        self.api.list_datasets().await
    }

    /// Create a table from a field list, prepending the implicit id
    /// column.
    pub async fn create_table(
        &self,
        table: &str,
        fields: Vec<Field>,
        dataset: Option<&str>,
    ) -> WarehouseResult<()> {
        let name = self.config.dataset(dataset);
        let schema = TableSchema::with_implicit_id(fields);

        info!(dataset = name, table, columns = schema.len(), "creating table");
        self.api.create_table(name, table, &schema).await
    }

    /// Delete a table.
    pub async fn delete_table(&self, table: &str, dataset: Option<&str>) -> WarehouseResult<()> {
        let name = self.config.dataset(dataset);
        info!(dataset = name, table, "deleting table");
        self.api.delete_table(name, table).await
    }

    /// List table names in a dataset.
    pub async fn list_tables(&self, dataset: Option<&str>) -> WarehouseResult<Vec<String>> {
        let name = self.config.dataset(dataset);
        self.api.list_tables(name).await
    }

    /// Create a table whose schema is mapped from the relational source.
    ///
    /// The source's column list is mapped through the TTL cache, so a
    /// repeat within the cache lifetime skips introspection. Creation is
    /// skipped when the table already exists; with `wait_ready` the call
    /// re-lists tables under the poll policy until the new table shows up,
    /// since fresh tables are not instantly visible.
    pub async fn create_table_from_source(
        &self,
        source: &dyn SourceStore,
        mapper: &CachedMapper,
        hints: &StructHints,
        table: &str,
        dataset: Option<&str>,
        wait_ready: bool,
    ) -> WarehouseResult<()> {
        if self.list_tables(dataset).await?.iter().any(|t| t == table) {
            debug!(table, "table already exists, skipping creation");
            return Ok(());
        }

        let fields = match mapper.get(table) {
            Some(fields) => fields,
            None => {
                let columns = source.describe(table).await?;
                let fields = map_columns(&columns, hints);
                mapper.store(table, fields.clone());
                fields
            }
        };

        self.create_table(table, fields, dataset).await?;

        if wait_ready {
            self.wait_for_table(table, dataset).await?;
        }

        Ok(())
    }

    /// Re-list tables until the given table appears, bounded by the poll
    /// policy.
    async fn wait_for_table(&self, table: &str, dataset: Option<&str>) -> WarehouseResult<()> {
        let poll = &self.config.poll;

        for attempt in 1..=poll.max_attempts {
            if self.list_tables(dataset).await?.iter().any(|t| t == table) {
                return Ok(());
            }
            debug!(table, attempt, "table not visible yet");
            tokio::time::sleep(poll.pause()).await;
        }

        Err(WarehouseError::Timeout {
            handle: format!("table {}", table),
            attempts: poll.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySource, MemoryWarehouse};
    use rowlake_schema::{FieldMode, FieldType, SourceColumn};
    use std::time::Duration;

    fn setup() -> (Arc<MemoryWarehouse>, Catalog) {
        let api = Arc::new(MemoryWarehouse::new());
        let config = Arc::new(
            WarehouseConfig::new("acme-project", "analytics")
                .poll(crate::PollPolicy::new().interval(Duration::from_millis(1))),
        );
        let catalog = Catalog::new(api.clone(), config);
        (api, catalog)
    }

    #[tokio::test]
    async fn test_dataset_lifecycle() {
        let (_api, catalog) = setup();

        assert!(!catalog.dataset_exists(None).await.unwrap());
        catalog.create_dataset(None).await.unwrap();
        assert!(catalog.dataset_exists(None).await.unwrap());
        assert_eq!(catalog.list_datasets().await.unwrap(), vec!["analytics"]);
    }

    #[tokio::test]
    async fn test_create_dataset_twice_is_rejected() {
        let (_api, catalog) = setup();

        catalog.create_dataset(None).await.unwrap();
        let err = catalog.create_dataset(None).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_create_table_prepends_id() {
        let (api, catalog) = setup();
        catalog.create_dataset(None).await.unwrap();

        catalog
            .create_table(
                "users",
                vec![Field::new("username", FieldType::String).required()],
                None,
            )
            .await
            .unwrap();

        let schema = api.table_schema("analytics", "users").unwrap();
        assert_eq!(schema.fields[0].name, "id");
        assert_eq!(schema.fields[0].field_type, FieldType::Integer);
        assert_eq!(schema.fields[0].mode, FieldMode::Required);
    }

    #[tokio::test]
    async fn test_create_table_twice_is_rejected() {
        let (_api, catalog) = setup();
        catalog.create_dataset(None).await.unwrap();

        catalog.create_table("users", vec![], None).await.unwrap();
        let err = catalog.create_table("users", vec![], None).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_delete_table_and_dataset() {
        let (api, catalog) = setup();
        catalog.create_dataset(None).await.unwrap();
        catalog.create_table("users", vec![], None).await.unwrap();

        catalog.delete_table("users", None).await.unwrap();
        assert!(api.table_schema("analytics", "users").is_none());

        let err = catalog.delete_table("users", None).await.unwrap_err();
        assert!(err.is_not_found());

        catalog.delete_dataset(None).await.unwrap();
        assert!(!catalog.dataset_exists(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_table_from_source_waits_for_visibility() {
        let (api, catalog) = setup();
        catalog.create_dataset(None).await.unwrap();

        let source = MemorySource::new().table(
            "orders",
            vec![SourceColumn::new("total", "decimal(10,2)", false)],
            vec![],
        );

        catalog
            .create_table_from_source(
                &source,
                &CachedMapper::new(),
                &StructHints::new(),
                "orders",
                None,
                true,
            )
            .await
            .unwrap();
        assert!(api.table_schema("analytics", "orders").is_some());
    }

    #[tokio::test]
    async fn test_create_table_from_source_caches_mapping() {
        let (api, catalog) = setup();
        catalog.create_dataset(None).await.unwrap();

        let source = MemorySource::new().table(
            "users",
            vec![SourceColumn::new("username", "varchar(255)", false)],
            vec![],
        );
        let mapper = CachedMapper::new();

        catalog
            .create_table_from_source(&source, &mapper, &StructHints::new(), "users", None, false)
            .await
            .unwrap();
        assert_eq!(source.describe_calls("users"), 1);
        assert!(api.table_schema("analytics", "users").is_some());

        // A second run finds the table and never re-introspects.
        catalog
            .create_table_from_source(&source, &mapper, &StructHints::new(), "users", None, false)
            .await
            .unwrap();
        assert_eq!(source.describe_calls("users"), 1);
    }
}
