use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::ExportResult;
use crate::schema::{
    TableSchema,
    WriteMode,
};
use crate::types::{
    MetricRow,
    SinkTarget,
};

/// Date-partitioned warehouse destination.
///
/// Implementations bound their own load concurrency; callers may issue
/// writes for several tables at once.
#[async_trait]
pub trait WarehouseSink: Send + Sync {
    /// Create the table if it is missing. Returns `true` when it was created.
    async fn ensure_table(&self, schema: &TableSchema) -> ExportResult<bool>;

    /// Delete the rows of one date partition that belong to `app_name`
    async fn delete_partition_rows(
        &self, schema: &TableSchema, date: NaiveDate, app_name: &str,
    ) -> ExportResult<u64>;

    /// Bulk load rows into one date partition
    async fn load_partition(
        &self, schema: &TableSchema, date: NaiveDate, rows: &[MetricRow], mode: WriteMode,
    ) -> ExportResult<u64>;

    /// Delete the app's rows of one date partition, then load `rows` into it.
    /// Returns the number of rows loaded.
    ///
    /// Sinks that bound load concurrency should hold a single load slot for
    /// both steps.
    async fn replace_partition(
        &self, schema: &TableSchema, date: NaiveDate, app_name: &str, rows: &[MetricRow],
        mode: WriteMode,
    ) -> ExportResult<u64> {
        self.delete_partition_rows(schema, date, app_name).await?;
        self.load_partition(schema, date, rows, mode).await
    }
}

/// Opens a sink for a project/dataset target, creating the dataset if needed
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    async fn connect(&self, target: &SinkTarget) -> ExportResult<Arc<dyn WarehouseSink>>;
}
