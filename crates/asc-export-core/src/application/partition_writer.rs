use std::collections::BTreeMap;
use std::sync::Arc;

use asc_export_api::{
    Dimension,
    ExportError,
    ExportResult,
    MetricRow,
    TableSchema,
    WarehouseSink,
    WriteMode,
};
use chrono::NaiveDate;
use futures::future::join_all;

use crate::domain::MetricCatalog;

/// Outcome of writing every date partition of one cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellWriteReport {
    pub table: String,
    pub partitions_written: usize,
    pub partitions_failed: usize,
    pub rows_written: u64,
}

/// Writes normalized rows into date partitions, replacing whatever the same
/// app already had there
pub struct PartitionWriter {
    sink: Arc<dyn WarehouseSink>,
    catalog: Arc<MetricCatalog>,
    app_name: String,
}

impl PartitionWriter {
    pub fn new(
        sink: Arc<dyn WarehouseSink>, catalog: Arc<MetricCatalog>, app_name: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            catalog,
            app_name: app_name.into(),
        }
    }

    fn schema(&self, measure: &str, dimension: &Dimension) -> ExportResult<TableSchema> {
        self.catalog
            .table_schema(measure, dimension)
            .ok_or_else(|| {
                ExportError::InvalidInput(format!(
                    "No table is defined for {measure} by {dimension}"
                ))
            })
    }

    async fn ensure_table(&self, schema: &TableSchema) -> ExportResult<()> {
        if self.sink.ensure_table(schema).await? {
            tracing::info!(table = %schema.name, "Created table {}", schema.name);
        }
        Ok(())
    }

    /// Deletes the app's rows in the partition, then bulk loads `rows`
    async fn replace_partition(
        &self, schema: &TableSchema, date: NaiveDate, rows: &[MetricRow], mode: WriteMode,
    ) -> ExportResult<u64> {
        self.sink
            .replace_partition(schema, date, &self.app_name, rows, mode)
            .await
    }

    /// Writes one (measure, dimension, date) partition and returns the table name
    pub async fn write_partition(
        &self, measure: &str, dimension: &Dimension, date: NaiveDate, rows: &[MetricRow],
        overwrite: bool,
    ) -> ExportResult<String> {
        let schema = self.schema(measure, dimension)?;
        self.ensure_table(&schema).await?;

        let loaded = self
            .replace_partition(&schema, date, rows, WriteMode::from_overwrite(overwrite))
            .await?;
        tracing::debug!(table = %schema.name, date = %date, rows = loaded, "Loaded partition");

        Ok(schema.name)
    }

    /// Writes every date partition of a cell. The table is ensured once and
    /// partitions are loaded concurrently; the sink bounds the actual load
    /// concurrency. Per-partition failures are logged and counted.
    pub async fn write_cell(
        &self, measure: &str, dimension: &Dimension,
        rows_by_date: BTreeMap<NaiveDate, Vec<MetricRow>>, overwrite: bool,
    ) -> ExportResult<CellWriteReport> {
        let schema = self.schema(measure, dimension)?;
        self.ensure_table(&schema).await?;

        let mode = WriteMode::from_overwrite(overwrite);
        let writes = rows_by_date
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(date, rows)| {
                let schema = &schema;
                async move {
                    let result = self.replace_partition(schema, *date, rows, mode).await;
                    (*date, result)
                }
            });

        let mut report = CellWriteReport {
            table: schema.name.clone(),
            ..CellWriteReport::default()
        };

        for (date, result) in join_all(writes).await {
            match result {
                Ok(rows) => {
                    report.partitions_written += 1;
                    report.rows_written += rows;
                }
                Err(e) => {
                    report.partitions_failed += 1;
                    tracing::error!(
                        table = %schema.name,
                        date = %date,
                        error = %e,
                        "Failed to write to table {} by {} for {}",
                        measure,
                        dimension,
                        date
                    );
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use asc_export_api::{
        MetricValue,
        SinkTarget,
        WarehouseConnector,
    };

    use super::*;
    use crate::infrastructure::warehouse::MemoryWarehouse;
    use crate::test_support::{
        date,
        target,
    };

    fn row(day: &str, app: &str, value: i64, label: Option<&str>) -> MetricRow {
        MetricRow {
            date: date(day),
            app_id: "1".to_string(),
            app_name: app.to_string(),
            value: MetricValue::Integer(value),
            dimension_value: label.map(str::to_string),
        }
    }

    async fn writer(
        warehouse: &MemoryWarehouse, target: &SinkTarget, app: &str,
    ) -> PartitionWriter {
        let sink = warehouse.connect(target).await.unwrap();
        PartitionWriter::new(sink, Arc::new(MetricCatalog::app_store()), app)
    }

    #[tokio::test]
    async fn test_write_partition_returns_table_name() {
        let warehouse = MemoryWarehouse::new();
        let writer = writer(&warehouse, &target(), "Firefox").await;

        let table = writer
            .write_partition(
                "installs",
                &Dimension::key("platform"),
                date("2020-01-02"),
                &[row("2020-01-02", "Firefox", 3, Some("iPhone"))],
                false,
            )
            .await
            .unwrap();

        assert_eq!(table, "installations_by_opt_in_platform");
        assert!(warehouse.has_table(&target(), &table));
    }

    #[tokio::test]
    async fn test_repeated_writes_are_idempotent() {
        let warehouse = MemoryWarehouse::new();
        let writer = writer(&warehouse, &target(), "Firefox").await;
        for _ in 0..3 {
            write_units(&writer, "Firefox", 3, false).await;
        }

        assert_eq!(
            warehouse.rows(&target(), "app_units_total"),
            vec![row("2020-01-02", "Firefox", 3, None)]
        );
    }

    async fn write_units(writer: &PartitionWriter, app: &str, value: i64, overwrite: bool) {
        writer
            .write_partition(
                "units",
                &Dimension::NoGrouping,
                date("2020-01-02"),
                &[row("2020-01-02", app, value, None)],
                overwrite,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_append_keeps_other_apps() {
        let warehouse = MemoryWarehouse::new();
        let focus = writer(&warehouse, &target(), "Focus").await;
        let firefox = writer(&warehouse, &target(), "Firefox").await;

        write_units(&focus, "Focus", 1, false).await;
        write_units(&firefox, "Firefox", 2, false).await;
        write_units(&firefox, "Firefox", 5, false).await;

        let rows = warehouse.rows(&target(), "app_units_total");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.app_name == "Focus"));
        assert!(rows
            .iter()
            .any(|r| r.app_name == "Firefox" && r.value == MetricValue::Integer(5)));
    }

    #[tokio::test]
    async fn test_overwrite_truncates_partition() {
        let warehouse = MemoryWarehouse::new();
        let focus = writer(&warehouse, &target(), "Focus").await;
        let firefox = writer(&warehouse, &target(), "Firefox").await;

        write_units(&focus, "Focus", 1, false).await;
        write_units(&firefox, "Firefox", 2, true).await;

        let rows = warehouse.rows(&target(), "app_units_total");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].app_name, "Firefox");
    }

    #[tokio::test]
    async fn test_write_cell_writes_each_date() {
        let warehouse = MemoryWarehouse::new();
        let writer = writer(&warehouse, &target(), "Firefox").await;

        let mut by_date = BTreeMap::new();
        by_date.insert(
            date("2020-01-01"),
            vec![row("2020-01-01", "Firefox", 1, Some("iPad"))],
        );
        by_date.insert(
            date("2020-01-02"),
            vec![
                row("2020-01-02", "Firefox", 2, Some("iPad")),
                row("2020-01-02", "Firefox", 3, Some("iPhone")),
            ],
        );
        by_date.insert(date("2020-01-03"), Vec::new());

        let report = writer
            .write_cell("installs", &Dimension::key("platform"), by_date, false)
            .await
            .unwrap();

        assert_eq!(report.table, "installations_by_opt_in_platform");
        assert_eq!(report.partitions_written, 2);
        assert_eq!(report.partitions_failed, 0);
        assert_eq!(report.rows_written, 3);
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected() {
        let warehouse = MemoryWarehouse::new();
        let writer = writer(&warehouse, &target(), "Firefox").await;

        let err = writer
            .write_partition(
                "units",
                &Dimension::key("pageType"),
                date("2020-01-02"),
                &[],
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidInput(_)));
    }
}
