use std::collections::HashMap;
use std::sync::{
    Arc,
    RwLock,
};

use asc_export_api::{
    ExportError,
    ExportResult,
    MetricRow,
    SinkTarget,
    TableSchema,
    WarehouseConnector,
    WarehouseSink,
    WriteMode,
};
use async_trait::async_trait;
use chrono::NaiveDate;

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<MetricRow>,
}

type Datasets = HashMap<(String, String), HashMap<String, MemoryTable>>;

/// In-process warehouse, used for dry runs and tests.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    datasets: Arc<RwLock<Datasets>>,
}

fn dataset_key(target: &SinkTarget) -> (String, String) {
    (target.project.clone(), target.dataset.clone())
}

fn poisoned<E: std::fmt::Display>(e: E) -> ExportError {
    ExportError::Internal(format!("Lock poisoned: {}", e))
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_dataset(&self, target: &SinkTarget) -> bool {
        self.datasets
            .read()
            .map(|d| d.contains_key(&dataset_key(target)))
            .unwrap_or(false)
    }

    pub fn has_table(&self, target: &SinkTarget, table: &str) -> bool {
        self.datasets
            .read()
            .map(|d| {
                d.get(&dataset_key(target))
                    .is_some_and(|tables| tables.contains_key(table))
            })
            .unwrap_or(false)
    }

    pub fn table_names(&self, target: &SinkTarget) -> Vec<String> {
        let mut names: Vec<String> = self
            .datasets
            .read()
            .map(|d| {
                d.get(&dataset_key(target))
                    .map(|tables| tables.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Rows of a table, ordered by date
    pub fn rows(&self, target: &SinkTarget, table: &str) -> Vec<MetricRow> {
        let mut rows: Vec<MetricRow> = self
            .datasets
            .read()
            .map(|d| {
                d.get(&dataset_key(target))
                    .and_then(|tables| tables.get(table))
                    .map(|t| t.rows.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.date);
        rows
    }

    pub fn schema(&self, target: &SinkTarget, table: &str) -> Option<TableSchema> {
        self.datasets.read().ok().and_then(|d| {
            d.get(&dataset_key(target))
                .and_then(|tables| tables.get(table))
                .map(|t| t.schema.clone())
        })
    }

    fn with_table<T>(
        &self, target: &SinkTarget, table: &str, f: impl FnOnce(&mut MemoryTable) -> T,
    ) -> ExportResult<T> {
        let mut datasets = self.datasets.write().map_err(poisoned)?;
        let tables = datasets
            .get_mut(&dataset_key(target))
            .ok_or_else(|| ExportError::Sink(format!("Dataset {} not found", target.dataset)))?;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| ExportError::Sink(format!("Table {table} not found")))?;
        Ok(f(table))
    }
}

#[async_trait]
impl WarehouseConnector for MemoryWarehouse {
    async fn connect(&self, target: &SinkTarget) -> ExportResult<Arc<dyn WarehouseSink>> {
        let mut datasets = self.datasets.write().map_err(poisoned)?;
        if !datasets.contains_key(&dataset_key(target)) {
            datasets.insert(dataset_key(target), HashMap::new());
            tracing::info!("Created dataset: {}", target.dataset);
        }

        Ok(Arc::new(MemoryDataset {
            warehouse: self.clone(),
            target: target.clone(),
        }))
    }
}

/// Sink view of one dataset in a [`MemoryWarehouse`]
pub struct MemoryDataset {
    warehouse: MemoryWarehouse,
    target: SinkTarget,
}

#[async_trait]
impl WarehouseSink for MemoryDataset {
    async fn ensure_table(&self, schema: &TableSchema) -> ExportResult<bool> {
        let mut datasets = self.warehouse.datasets.write().map_err(poisoned)?;
        let tables = datasets.entry(dataset_key(&self.target)).or_default();

        if tables.contains_key(&schema.name) {
            return Ok(false);
        }

        tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(true)
    }

    async fn delete_partition_rows(
        &self, schema: &TableSchema, date: NaiveDate, app_name: &str,
    ) -> ExportResult<u64> {
        self.warehouse
            .with_table(&self.target, &schema.name, |table| {
                let before = table.rows.len();
                table
                    .rows
                    .retain(|r| !(r.date == date && r.app_name == app_name));
                (before - table.rows.len()) as u64
            })
    }

    async fn load_partition(
        &self, schema: &TableSchema, date: NaiveDate, rows: &[MetricRow], mode: WriteMode,
    ) -> ExportResult<u64> {
        if let Some(row) = rows.iter().find(|r| r.date != date) {
            return Err(ExportError::Sink(format!(
                "Row dated {} does not belong to partition {}",
                row.date, date
            )));
        }

        self.warehouse
            .with_table(&self.target, &schema.name, |table| {
                if mode == WriteMode::Truncate {
                    table.rows.retain(|r| r.date != date);
                }
                table.rows.extend_from_slice(rows);
                rows.len() as u64
            })
    }
}

#[cfg(test)]
mod tests {
    use asc_export_api::{
        ColumnDefinition,
        ColumnType,
        MetricValue,
    };

    use super::*;
    use crate::test_support::{
        date,
        target,
    };

    fn schema() -> TableSchema {
        TableSchema::new("app_units_total", "Units")
            .add_column(ColumnDefinition::required("date", ColumnType::Date))
            .add_column(ColumnDefinition::required("app_name", ColumnType::String))
            .add_column(ColumnDefinition::required("app_units", ColumnType::Integer))
    }

    fn row(day: &str, app: &str) -> MetricRow {
        MetricRow {
            date: date(day),
            app_id: "1".to_string(),
            app_name: app.to_string(),
            value: MetricValue::Integer(1),
            dimension_value: None,
        }
    }

    #[tokio::test]
    async fn test_connect_creates_dataset() {
        let warehouse = MemoryWarehouse::new();
        assert!(!warehouse.has_dataset(&target()));

        warehouse.connect(&target()).await.unwrap();
        assert!(warehouse.has_dataset(&target()));
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let warehouse = MemoryWarehouse::new();
        let sink = warehouse.connect(&target()).await.unwrap();

        assert!(sink.ensure_table(&schema()).await.unwrap());
        assert!(!sink.ensure_table(&schema()).await.unwrap());
        assert_eq!(warehouse.table_names(&target()), vec!["app_units_total"]);
        assert_eq!(warehouse.schema(&target(), "app_units_total"), Some(schema()));
    }

    #[tokio::test]
    async fn test_delete_only_touches_app_and_date() {
        let warehouse = MemoryWarehouse::new();
        let sink = warehouse.connect(&target()).await.unwrap();
        sink.ensure_table(&schema()).await.unwrap();

        let day = date("2020-01-02");
        let rows = [row("2020-01-02", "Firefox"), row("2020-01-02", "Focus")];
        sink.load_partition(&schema(), day, &rows, WriteMode::Append)
            .await
            .unwrap();
        let rows = [row("2020-01-03", "Firefox")];
        sink.load_partition(&schema(), date("2020-01-03"), &rows, WriteMode::Append)
            .await
            .unwrap();

        let deleted = sink
            .delete_partition_rows(&schema(), day, "Firefox")
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(
            warehouse.rows(&target(), "app_units_total"),
            vec![row("2020-01-02", "Focus"), row("2020-01-03", "Firefox")]
        );
    }

    #[tokio::test]
    async fn test_load_rejects_rows_outside_partition() {
        let warehouse = MemoryWarehouse::new();
        let sink = warehouse.connect(&target()).await.unwrap();
        sink.ensure_table(&schema()).await.unwrap();

        let rows = [row("2020-01-03", "Firefox")];
        let err = sink
            .load_partition(&schema(), date("2020-01-02"), &rows, WriteMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Sink(_)));
    }

    #[tokio::test]
    async fn test_load_into_missing_table_fails() {
        let warehouse = MemoryWarehouse::new();
        let sink = warehouse.connect(&target()).await.unwrap();

        let err = sink
            .load_partition(&schema(), date("2020-01-02"), &[], WriteMode::Append)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Table app_units_total not found"));
    }
}
