use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use std::time::Duration;

use asc_export_api::{
    ColumnType,
    ExportError,
    ExportResult,
    MetricRow,
    MetricValue,
    SinkTarget,
    TableSchema,
    WarehouseConnector,
    WarehouseSink,
    WriteMode,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{
    PgArguments,
    PgPool,
};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{
    Postgres,
    Row as SqlxRow,
    Sqlite,
    SqlitePool,
};
use tokio::sync::Semaphore;
use tokio::time::sleep;

use super::database::{
    init_sqlite_dataset,
    quote_ident,
    quote_literal,
};

const INSERT_BATCH_SIZE: usize = 100;
const CATALOG_TABLE: &str = "_asc_export_tables";

async fn retry_on_busy<F, Fut, T>(operation: F) -> ExportResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ExportResult<T>>,
{
    const MAX_RETRIES: u32 = 3;
    const INITIAL_DELAY_MS: u64 = 10;

    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::warn!(
                        "SQLite operation succeeded after {} retries ({}ms total)",
                        attempt,
                        INITIAL_DELAY_MS * (2_u64.pow(attempt) - 1)
                    );
                }
                return Ok(result);
            }
            Err(ExportError::Sink(ref msg))
                if (msg.contains("database is locked")
                    || msg.contains("SQLITE_BUSY")
                    || msg.contains("locked"))
                    && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                let delay = INITIAL_DELAY_MS * 2_u64.pow(attempt - 1);
                tracing::debug!(
                    "SQLite busy, retry {}/{} (waiting {}ms)",
                    attempt,
                    MAX_RETRIES,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::error!("SQLite operation failed after {} retries: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}

fn sink_error(action: &'static str) -> impl Fn(sqlx::Error) -> ExportError {
    move |e| ExportError::Sink(format!("Failed to {}: {}", action, e))
}

#[derive(Clone)]
pub enum DatabasePool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl DatabasePool {
    pub fn is_postgres(&self) -> bool {
        matches!(self, DatabasePool::Postgres(_))
    }

    pub fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            DatabasePool::Sqlite(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_postgres(&self) -> Option<&PgPool> {
        match self {
            DatabasePool::Postgres(pool) => Some(pool),
            _ => None,
        }
    }

    fn placeholder(&self, index: usize) -> String {
        if self.is_postgres() {
            format!("${}", index)
        } else {
            "?".to_string()
        }
    }

    fn column_type(&self, column_type: ColumnType) -> &'static str {
        match (self.is_postgres(), column_type) {
            (true, ColumnType::Date) => "DATE",
            (false, ColumnType::Date) => "TEXT",
            (_, ColumnType::String) => "TEXT",
            (true, ColumnType::Integer) => "BIGINT",
            (false, ColumnType::Integer) => "INTEGER",
            (true, ColumnType::Float) => "DOUBLE PRECISION",
            (false, ColumnType::Float) => "REAL",
        }
    }
}

/// Where SQL datasets live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlBackend {
    /// One SQLite file per dataset, at `<data_dir>/<project>/<dataset>.db`
    Sqlite { data_dir: PathBuf },
    /// One PostgreSQL schema per dataset
    Postgres { connection_string: String },
}

/// Warehouse backed by sqlx.
///
/// The load permits are shared by every dataset opened through the same
/// warehouse.
pub struct SqlWarehouse {
    backend: SqlBackend,
    load_permits: Arc<Semaphore>,
    max_connections: u32,
}

impl SqlWarehouse {
    pub fn new(backend: SqlBackend, max_concurrent_loads: usize) -> Self {
        let max_concurrent_loads = max_concurrent_loads.max(1);
        Self {
            backend,
            load_permits: Arc::new(Semaphore::new(max_concurrent_loads)),
            max_connections: max_concurrent_loads.min(50) as u32,
        }
    }

    pub fn sqlite(data_dir: impl Into<PathBuf>, max_concurrent_loads: usize) -> Self {
        Self::new(
            SqlBackend::Sqlite {
                data_dir: data_dir.into(),
            },
            max_concurrent_loads,
        )
    }

    pub fn backend(&self) -> &SqlBackend {
        &self.backend
    }

    /// File backing a dataset on the SQLite backend
    pub fn dataset_path(data_dir: &Path, target: &SinkTarget) -> ExportResult<PathBuf> {
        for part in [&target.project, &target.dataset] {
            let valid = !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(ExportError::SinkInit(format!(
                    "'{}' is not a valid project or dataset name",
                    part
                )));
            }
        }

        Ok(data_dir
            .join(&target.project)
            .join(format!("{}.db", target.dataset)))
    }

    async fn open_sqlite(
        &self, data_dir: &Path, target: &SinkTarget,
    ) -> ExportResult<DatabasePool> {
        let path = Self::dataset_path(data_dir, target)?;
        let created = !path.exists();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExportError::SinkInit(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let pool = init_sqlite_dataset(path.clone(), self.max_connections)
            .await
            .map_err(|e| {
                ExportError::SinkInit(format!("Failed to open {}: {}", path.display(), e))
            })?;

        if created {
            tracing::info!("Created dataset: {}", target.dataset);
        }

        Ok(DatabasePool::Sqlite(pool))
    }

    #[cfg(feature = "postgres")]
    async fn open_postgres(
        &self, connection_string: &str, target: &SinkTarget,
    ) -> ExportResult<DatabasePool> {
        let (pool, created) = super::database::init_postgres_dataset(
            connection_string,
            &target.dataset,
            self.max_connections,
        )
        .await
        .map_err(|e| ExportError::SinkInit(format!("Failed to open {}: {}", target.dataset, e)))?;

        if created {
            tracing::info!("Created dataset: {}", target.dataset);
        }

        Ok(DatabasePool::Postgres(pool))
    }

    #[cfg(not(feature = "postgres"))]
    async fn open_postgres(&self, _: &str, _: &SinkTarget) -> ExportResult<DatabasePool> {
        Err(ExportError::SinkInit(
            "PostgreSQL support is not enabled in this build".to_string(),
        ))
    }
}

#[async_trait]
impl WarehouseConnector for SqlWarehouse {
    async fn connect(&self, target: &SinkTarget) -> ExportResult<Arc<dyn WarehouseSink>> {
        let pool = match &self.backend {
            SqlBackend::Sqlite { data_dir } => self.open_sqlite(data_dir, target).await?,
            SqlBackend::Postgres { connection_string } => {
                self.open_postgres(connection_string, target).await?
            }
        };

        tracing::debug!(
            project = %target.project,
            dataset = %target.dataset,
            postgres = pool.is_postgres(),
            "Connected to warehouse dataset"
        );

        Ok(Arc::new(SqlDataset::new(pool, self.load_permits.clone())))
    }
}

#[derive(Debug, Clone, Copy)]
enum SqlValue<'a> {
    Date(NaiveDate),
    Text(&'a str),
    Integer(i64),
    Float(f64),
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;
type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_sqlite<'q>(query: SqliteQuery<'q>, value: SqlValue<'q>) -> SqliteQuery<'q> {
    match value {
        SqlValue::Date(date) => query.bind(date),
        SqlValue::Text(text) => query.bind(text),
        SqlValue::Integer(value) => query.bind(value),
        SqlValue::Float(value) => query.bind(value),
    }
}

fn bind_postgres<'q>(query: PgQuery<'q>, value: SqlValue<'q>) -> PgQuery<'q> {
    match value {
        SqlValue::Date(date) => query.bind(date),
        SqlValue::Text(text) => query.bind(text),
        SqlValue::Integer(value) => query.bind(value),
        SqlValue::Float(value) => query.bind(value),
    }
}

/// Row as stored in a metric table
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub app_name: String,
    pub value: MetricValue,
    pub dimension_value: Option<String>,
}

/// Sink over one dataset of a [`SqlWarehouse`]
pub struct SqlDataset {
    pool: DatabasePool,
    load_permits: Arc<Semaphore>,
}

impl SqlDataset {
    pub fn new(pool: DatabasePool, load_permits: Arc<Semaphore>) -> Self {
        Self { pool, load_permits }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    fn create_table_sql(&self, schema: &TableSchema) -> ExportResult<String> {
        let columns = schema
            .columns
            .iter()
            .map(|column| {
                Ok(format!(
                    "{} {}{}",
                    quote_ident(&column.name)?,
                    self.pool.column_type(column.column_type),
                    if column.required { " NOT NULL" } else { "" }
                ))
            })
            .collect::<ExportResult<Vec<_>>>()?;

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&schema.name)?,
            columns.join(", ")
        ))
    }

    fn create_index_sql(&self, schema: &TableSchema) -> ExportResult<String> {
        Ok(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({}, app_name)",
            quote_ident(&format!("{}_partition_idx", schema.name))?,
            quote_ident(&schema.name)?,
            quote_ident(&schema.partition_field)?
        ))
    }

    fn catalog_insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (table_name, description, partition_field, columns_json) VALUES ({}, {}, {}, {}) ON CONFLICT (table_name) DO NOTHING",
            CATALOG_TABLE,
            self.pool.placeholder(1),
            self.pool.placeholder(2),
            self.pool.placeholder(3),
            self.pool.placeholder(4)
        )
    }

    fn delete_sql(&self, schema: &TableSchema, by_app: bool) -> ExportResult<String> {
        let mut sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            quote_ident(&schema.name)?,
            quote_ident(&schema.partition_field)?,
            self.pool.placeholder(1)
        );
        if by_app {
            sql.push_str(&format!(" AND app_name = {}", self.pool.placeholder(2)));
        }
        Ok(sql)
    }

    fn insert_sql(&self, schema: &TableSchema, row_count: usize) -> ExportResult<String> {
        let columns = schema
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<ExportResult<Vec<_>>>()?;

        let width = columns.len();
        let values_clause = (0..row_count)
            .map(|row| {
                let placeholders = (1..=width)
                    .map(|col| self.pool.placeholder(row * width + col))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", placeholders)
            })
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(&schema.name)?,
            columns.join(", "),
            values_clause
        ))
    }

    fn select_sql(&self, schema: &TableSchema) -> ExportResult<String> {
        let value_column = schema
            .columns
            .get(2)
            .map(|c| quote_ident(&c.name))
            .transpose()?
            .ok_or_else(|| {
                ExportError::InvalidInput(format!("{} has no value column", schema.name))
            })?;
        let label_column = match schema.columns.get(3) {
            Some(column) => quote_ident(&column.name)?,
            None => "NULL".to_string(),
        };

        Ok(format!(
            "SELECT app_name, {} AS metric_value, {} AS dimension_value FROM {} WHERE {} = {} ORDER BY app_name, metric_value, dimension_value",
            value_column,
            label_column,
            quote_ident(&schema.name)?,
            quote_ident(&schema.partition_field)?,
            self.pool.placeholder(1)
        ))
    }

    /// Bind values for each row, in schema column order
    fn row_values<'a>(
        schema: &TableSchema, date: NaiveDate, rows: &'a [MetricRow],
    ) -> ExportResult<Vec<Vec<SqlValue<'a>>>> {
        let value_type = schema.value_type().unwrap_or(ColumnType::Integer);

        rows.iter()
            .map(|row| {
                if row.date != date {
                    return Err(ExportError::Sink(format!(
                        "Row dated {} does not belong to partition {}",
                        row.date, date
                    )));
                }

                let value = match value_type {
                    ColumnType::Float => SqlValue::Float(row.value.as_f64()),
                    _ => SqlValue::Integer(row.value.as_i64()),
                };
                let mut values = vec![
                    SqlValue::Date(row.date),
                    SqlValue::Text(&row.app_name),
                    value,
                ];

                if schema.has_dimension_column() {
                    let label = row.dimension_value.as_deref().ok_or_else(|| {
                        ExportError::Sink(format!(
                            "Row for {} in {} has no dimension value",
                            row.date, schema.name
                        ))
                    })?;
                    values.push(SqlValue::Text(label));
                }

                Ok(values)
            })
            .collect()
    }

    async fn acquire_load_permit(&self) -> ExportResult<tokio::sync::SemaphorePermit<'_>> {
        self.load_permits
            .acquire()
            .await
            .map_err(|e| ExportError::Internal(format!("Load permits closed: {}", e)))
    }

    /// Loads one partition in a single transaction. With `replace_app` the
    /// app's existing rows are deleted first. Callers hold a load permit.
    async fn load_rows(
        &self, schema: &TableSchema, date: NaiveDate, replace_app: Option<&str>,
        rows: &[MetricRow], mode: WriteMode,
    ) -> ExportResult<u64> {
        let values = Self::row_values(schema, date, rows)?;
        let delete_app = self.delete_sql(schema, true)?;
        let truncate = self.delete_sql(schema, false)?;

        let start = std::time::Instant::now();
        let loaded = match &self.pool {
            DatabasePool::Sqlite(pool) => {
                retry_on_busy(|| async {
                    let mut tx = pool.begin().await.map_err(sink_error("begin load"))?;

                    if let Some(app_name) = replace_app {
                        sqlx::query(&delete_app)
                            .bind(date)
                            .bind(app_name)
                            .execute(&mut *tx)
                            .await
                            .map_err(sink_error("delete partition rows"))?;
                    }

                    if mode == WriteMode::Truncate {
                        sqlx::query(&truncate)
                            .bind(date)
                            .execute(&mut *tx)
                            .await
                            .map_err(sink_error("truncate partition"))?;
                    }

                    for chunk in values.chunks(INSERT_BATCH_SIZE) {
                        let sql = self.insert_sql(schema, chunk.len())?;
                        let mut query = sqlx::query(&sql);
                        for value in chunk.iter().flatten() {
                            query = bind_sqlite(query, *value);
                        }
                        query
                            .execute(&mut *tx)
                            .await
                            .map_err(sink_error("load partition"))?;
                    }

                    tx.commit().await.map_err(sink_error("commit load"))?;
                    Ok(values.len() as u64)
                })
                .await?
            }
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(sink_error("begin load"))?;

                if let Some(app_name) = replace_app {
                    sqlx::query(&delete_app)
                        .bind(date)
                        .bind(app_name)
                        .execute(&mut *tx)
                        .await
                        .map_err(sink_error("delete partition rows"))?;
                }

                if mode == WriteMode::Truncate {
                    sqlx::query(&truncate)
                        .bind(date)
                        .execute(&mut *tx)
                        .await
                        .map_err(sink_error("truncate partition"))?;
                }

                for chunk in values.chunks(INSERT_BATCH_SIZE) {
                    let sql = self.insert_sql(schema, chunk.len())?;
                    let mut query = sqlx::query(&sql);
                    for value in chunk.iter().flatten() {
                        query = bind_postgres(query, *value);
                    }
                    query
                        .execute(&mut *tx)
                        .await
                        .map_err(sink_error("load partition"))?;
                }

                tx.commit().await.map_err(sink_error("commit load"))?;
                values.len() as u64
            }
        };

        tracing::debug!(
            table = %schema.name,
            date = %date,
            rows = loaded,
            replaced_app = replace_app.unwrap_or(""),
            truncate = mode == WriteMode::Truncate,
            elapsed_ms = start.elapsed().as_millis(),
            "Loaded partition"
        );

        Ok(loaded)
    }

    /// Rows of one date partition, ordered by app, value and label
    pub async fn partition_rows(
        &self, schema: &TableSchema, date: NaiveDate,
    ) -> ExportResult<Vec<StoredRow>> {
        let sql = self.select_sql(schema)?;
        let is_float = schema.value_type() == Some(ColumnType::Float);
        let has_dimension = schema.has_dimension_column();

        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(date)
                    .fetch_all(pool)
                    .await
                    .map_err(sink_error("read partition"))?;

                rows.iter()
                    .map(|row| {
                        let value = if is_float {
                            MetricValue::Float(
                                row.try_get("metric_value")
                                    .map_err(sink_error("decode value"))?,
                            )
                        } else {
                            MetricValue::Integer(
                                row.try_get("metric_value")
                                    .map_err(sink_error("decode value"))?,
                            )
                        };
                        let dimension_value = if has_dimension {
                            Some(
                                row.try_get("dimension_value")
                                    .map_err(sink_error("decode label"))?,
                            )
                        } else {
                            None
                        };

                        Ok(StoredRow {
                            app_name: row
                                .try_get("app_name")
                                .map_err(sink_error("decode app_name"))?,
                            value,
                            dimension_value,
                        })
                    })
                    .collect()
            }
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(date)
                    .fetch_all(pool)
                    .await
                    .map_err(sink_error("read partition"))?;

                rows.iter()
                    .map(|row| {
                        let value = if is_float {
                            MetricValue::Float(
                                row.try_get("metric_value")
                                    .map_err(sink_error("decode value"))?,
                            )
                        } else {
                            MetricValue::Integer(
                                row.try_get("metric_value")
                                    .map_err(sink_error("decode value"))?,
                            )
                        };
                        let dimension_value = if has_dimension {
                            Some(
                                row.try_get("dimension_value")
                                    .map_err(sink_error("decode label"))?,
                            )
                        } else {
                            None
                        };

                        Ok(StoredRow {
                            app_name: row
                                .try_get("app_name")
                                .map_err(sink_error("decode app_name"))?,
                            value,
                            dimension_value,
                        })
                    })
                    .collect()
            }
        }
    }
}

#[async_trait]
impl WarehouseSink for SqlDataset {
    async fn ensure_table(&self, schema: &TableSchema) -> ExportResult<bool> {
        let create_table = self.create_table_sql(schema)?;
        let create_index = self.create_index_sql(schema)?;
        let catalog_insert = self.catalog_insert_sql();
        let columns_json = serde_json::to_string(&schema.columns)?;

        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                retry_on_busy(|| async {
                    let existing: i64 = sqlx::query_scalar(
                        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    )
                    .bind(&schema.name)
                    .fetch_one(pool)
                    .await
                    .map_err(sink_error("look up table"))?;

                    if existing > 0 {
                        return Ok(false);
                    }

                    let mut tx = pool.begin().await.map_err(sink_error("begin transaction"))?;
                    sqlx::query(&create_table)
                        .execute(&mut *tx)
                        .await
                        .map_err(sink_error("create table"))?;
                    sqlx::query(&create_index)
                        .execute(&mut *tx)
                        .await
                        .map_err(sink_error("create partition index"))?;
                    sqlx::query(&catalog_insert)
                        .bind(&schema.name)
                        .bind(&schema.description)
                        .bind(&schema.partition_field)
                        .bind(&columns_json)
                        .execute(&mut *tx)
                        .await
                        .map_err(sink_error("record table"))?;
                    tx.commit().await.map_err(sink_error("commit table"))?;

                    Ok(true)
                })
                .await
            }
            DatabasePool::Postgres(pool) => {
                let existing: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1",
                )
                .bind(&schema.name)
                .fetch_one(pool)
                .await
                .map_err(sink_error("look up table"))?;

                if existing > 0 {
                    return Ok(false);
                }

                let comment = format!(
                    "COMMENT ON TABLE {} IS {}",
                    quote_ident(&schema.name)?,
                    quote_literal(&schema.description)
                );

                let mut tx = pool.begin().await.map_err(sink_error("begin transaction"))?;
                for statement in [&create_table, &create_index, &comment] {
                    sqlx::query(statement)
                        .execute(&mut *tx)
                        .await
                        .map_err(sink_error("create table"))?;
                }
                sqlx::query(&catalog_insert)
                    .bind(&schema.name)
                    .bind(&schema.description)
                    .bind(&schema.partition_field)
                    .bind(&columns_json)
                    .execute(&mut *tx)
                    .await
                    .map_err(sink_error("record table"))?;
                tx.commit().await.map_err(sink_error("commit table"))?;

                Ok(true)
            }
        }
    }

    async fn delete_partition_rows(
        &self, schema: &TableSchema, date: NaiveDate, app_name: &str,
    ) -> ExportResult<u64> {
        let sql = self.delete_sql(schema, true)?;
        let _permit = self.acquire_load_permit().await?;

        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                retry_on_busy(|| async {
                    let result = sqlx::query(&sql)
                        .bind(date)
                        .bind(app_name)
                        .execute(pool)
                        .await
                        .map_err(sink_error("delete partition rows"))?;
                    Ok(result.rows_affected())
                })
                .await
            }
            DatabasePool::Postgres(pool) => {
                let result = sqlx::query(&sql)
                    .bind(date)
                    .bind(app_name)
                    .execute(pool)
                    .await
                    .map_err(sink_error("delete partition rows"))?;
                Ok(result.rows_affected())
            }
        }
    }

    async fn load_partition(
        &self, schema: &TableSchema, date: NaiveDate, rows: &[MetricRow], mode: WriteMode,
    ) -> ExportResult<u64> {
        let _permit = self.acquire_load_permit().await?;
        self.load_rows(schema, date, None, rows, mode).await
    }

    async fn replace_partition(
        &self, schema: &TableSchema, date: NaiveDate, app_name: &str, rows: &[MetricRow],
        mode: WriteMode,
    ) -> ExportResult<u64> {
        let _permit = self.acquire_load_permit().await?;
        self.load_rows(schema, date, Some(app_name), rows, mode).await
    }
}

#[cfg(test)]
mod tests {
    use asc_export_api::ColumnDefinition;

    use super::*;
    use crate::test_support::{
        date,
        target,
    };

    fn units_schema() -> TableSchema {
        TableSchema::new("app_units_total", "Units")
            .add_column(ColumnDefinition::required("date", ColumnType::Date))
            .add_column(ColumnDefinition::required("app_name", ColumnType::String))
            .add_column(ColumnDefinition::required("app_units", ColumnType::Integer))
    }

    fn rate_schema() -> TableSchema {
        TableSchema::new("opt_in_rate_by_platform", "Opt-in rate")
            .add_column(ColumnDefinition::required("date", ColumnType::Date))
            .add_column(ColumnDefinition::required("app_name", ColumnType::String))
            .add_column(ColumnDefinition::required("opt_in_rate", ColumnType::Float))
            .add_column(ColumnDefinition::required("platform", ColumnType::String))
    }

    fn row(day: &str, app: &str, value: MetricValue, label: Option<&str>) -> MetricRow {
        MetricRow {
            date: date(day),
            app_id: "1".to_string(),
            app_name: app.to_string(),
            value,
            dimension_value: label.map(str::to_string),
        }
    }

    fn stored(app: &str, value: i64) -> StoredRow {
        StoredRow {
            app_name: app.to_string(),
            value: MetricValue::Integer(value),
            dimension_value: None,
        }
    }

    async fn dataset(dir: &Path) -> SqlDataset {
        let pool = init_sqlite_dataset(dir.join("dataset.db"), 4).await.unwrap();
        SqlDataset::new(DatabasePool::Sqlite(pool), Arc::new(Semaphore::new(2)))
    }

    #[tokio::test]
    async fn test_connect_creates_dataset_file() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = SqlWarehouse::sqlite(dir.path(), 4);

        warehouse.connect(&target()).await.unwrap();

        assert!(dir
            .path()
            .join("test-project")
            .join("apple_app_store.db")
            .exists());
    }

    #[tokio::test]
    async fn test_connect_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = SqlWarehouse::sqlite(dir.path(), 4);
        let target = SinkTarget {
            project: "..".to_string(),
            dataset: "apple_app_store".to_string(),
        };

        let err = warehouse.connect(&target).await.err().unwrap();
        assert!(matches!(err, ExportError::SinkInit(_)));
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dataset(dir.path()).await;

        assert!(sink.ensure_table(&units_schema()).await.unwrap());
        assert!(!sink.ensure_table(&units_schema()).await.unwrap());

        let pool = sink.pool().as_sqlite().unwrap();
        let description: String = sqlx::query_scalar(
            "SELECT description FROM _asc_export_tables WHERE table_name = 'app_units_total'",
        )
        .fetch_one(pool)
        .await
        .unwrap();
        assert_eq!(description, "Units");
    }

    #[tokio::test]
    async fn test_delete_then_append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dataset(dir.path()).await;
        let schema = units_schema();
        sink.ensure_table(&schema).await.unwrap();

        let day = date("2020-01-02");
        let rows = [row("2020-01-02", "Firefox", MetricValue::Integer(3), None)];
        for _ in 0..3 {
            sink.delete_partition_rows(&schema, day, "Firefox")
                .await
                .unwrap();
            sink.load_partition(&schema, day, &rows, WriteMode::Append)
                .await
                .unwrap();
        }

        assert_eq!(
            sink.partition_rows(&schema, day).await.unwrap(),
            vec![stored("Firefox", 3)]
        );
    }

    #[tokio::test]
    async fn test_delete_keeps_other_apps_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dataset(dir.path()).await;
        let schema = units_schema();
        sink.ensure_table(&schema).await.unwrap();

        let day = date("2020-01-02");
        let rows = [
            row("2020-01-02", "Firefox", MetricValue::Integer(3), None),
            row("2020-01-02", "Focus", MetricValue::Integer(1), None),
        ];
        sink.load_partition(&schema, day, &rows, WriteMode::Append)
            .await
            .unwrap();
        let next = [row("2020-01-03", "Firefox", MetricValue::Integer(4), None)];
        sink.load_partition(&schema, date("2020-01-03"), &next, WriteMode::Append)
            .await
            .unwrap();

        let deleted = sink
            .delete_partition_rows(&schema, day, "Firefox")
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(
            sink.partition_rows(&schema, day).await.unwrap(),
            vec![stored("Focus", 1)]
        );
        assert_eq!(
            sink.partition_rows(&schema, date("2020-01-03"))
                .await
                .unwrap(),
            vec![stored("Firefox", 4)]
        );
    }

    #[tokio::test]
    async fn test_truncate_replaces_partition() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dataset(dir.path()).await;
        let schema = units_schema();
        sink.ensure_table(&schema).await.unwrap();

        let day = date("2020-01-02");
        let focus = [row("2020-01-02", "Focus", MetricValue::Integer(1), None)];
        sink.load_partition(&schema, day, &focus, WriteMode::Append)
            .await
            .unwrap();

        let firefox = [row("2020-01-02", "Firefox", MetricValue::Integer(2), None)];
        let loaded = sink
            .load_partition(&schema, day, &firefox, WriteMode::Truncate)
            .await
            .unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(
            sink.partition_rows(&schema, day).await.unwrap(),
            vec![stored("Firefox", 2)]
        );
    }

    #[tokio::test]
    async fn test_float_values_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dataset(dir.path()).await;
        let schema = rate_schema();
        sink.ensure_table(&schema).await.unwrap();

        let day = date("2020-01-02");
        let rows = [
            row("2020-01-02", "Firefox", MetricValue::Float(0.25), Some("iPhone")),
            row("2020-01-02", "Firefox", MetricValue::Float(0.5), Some("iPad")),
        ];
        sink.load_partition(&schema, day, &rows, WriteMode::Append)
            .await
            .unwrap();

        let stored = sink.partition_rows(&schema, day).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].value, MetricValue::Float(0.25));
        assert_eq!(stored[0].dimension_value.as_deref(), Some("iPhone"));
        assert_eq!(stored[1].dimension_value.as_deref(), Some("iPad"));
    }

    #[tokio::test]
    async fn test_load_spans_insert_batches() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dataset(dir.path()).await;
        let schema = units_schema();
        sink.ensure_table(&schema).await.unwrap();

        let day = date("2020-01-02");
        let rows: Vec<_> = (0..250)
            .map(|i| {
                row(
                    "2020-01-02",
                    &format!("app-{:03}", i),
                    MetricValue::Integer(i),
                    None,
                )
            })
            .collect();

        let loaded = sink
            .load_partition(&schema, day, &rows, WriteMode::Append)
            .await
            .unwrap();

        assert_eq!(loaded, 250);
        assert_eq!(sink.partition_rows(&schema, day).await.unwrap().len(), 250);
    }

    #[tokio::test]
    async fn test_grouped_row_without_label_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dataset(dir.path()).await;
        let schema = rate_schema();
        sink.ensure_table(&schema).await.unwrap();

        let rows = [row("2020-01-02", "Firefox", MetricValue::Float(0.1), None)];
        let err = sink
            .load_partition(&schema, date("2020-01-02"), &rows, WriteMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Sink(_)));
    }

    #[tokio::test]
    async fn test_replace_partition_holds_one_load_permit() {
        let dir = tempfile::tempdir().unwrap();
        let permits = Arc::new(Semaphore::new(1));
        let pool = init_sqlite_dataset(dir.path().join("dataset.db"), 4)
            .await
            .unwrap();
        let sink = Arc::new(SqlDataset::new(DatabasePool::Sqlite(pool), permits.clone()));
        let schema = units_schema();
        sink.ensure_table(&schema).await.unwrap();

        let day = date("2020-01-02");
        let existing = [
            row("2020-01-02", "Firefox", MetricValue::Integer(1), None),
            row("2020-01-02", "Focus", MetricValue::Integer(2), None),
        ];
        sink.load_partition(&schema, day, &existing, WriteMode::Append)
            .await
            .unwrap();

        let held = permits.clone().acquire_owned().await.unwrap();
        let task = {
            let sink = sink.clone();
            let schema = schema.clone();
            tokio::spawn(async move {
                let rows = [row("2020-01-02", "Firefox", MetricValue::Integer(3), None)];
                sink.replace_partition(&schema, day, "Firefox", &rows, WriteMode::Append)
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert!(!task.is_finished());
        assert_eq!(
            sink.partition_rows(&schema, day).await.unwrap(),
            vec![stored("Firefox", 1), stored("Focus", 2)]
        );

        drop(held);
        assert_eq!(task.await.unwrap().unwrap(), 1);
        assert_eq!(
            sink.partition_rows(&schema, day).await.unwrap(),
            vec![stored("Firefox", 3), stored("Focus", 2)]
        );
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_replace_partition_with_single_permit_completes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_sqlite_dataset(dir.path().join("dataset.db"), 4)
            .await
            .unwrap();
        let sink = SqlDataset::new(DatabasePool::Sqlite(pool), Arc::new(Semaphore::new(1)));
        let schema = units_schema();
        sink.ensure_table(&schema).await.unwrap();

        let day = date("2020-01-02");
        let rows = [row("2020-01-02", "Firefox", MetricValue::Integer(4), None)];
        for _ in 0..2 {
            let loaded = tokio::time::timeout(
                Duration::from_secs(10),
                sink.replace_partition(&schema, day, "Firefox", &rows, WriteMode::Append),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(loaded, 1);
        }

        assert_eq!(
            sink.partition_rows(&schema, day).await.unwrap(),
            vec![stored("Firefox", 4)]
        );
    }

    #[test]
    fn test_dataset_path() {
        let path = SqlWarehouse::dataset_path(Path::new("/data"), &target()).unwrap();
        assert_eq!(path, PathBuf::from("/data/test-project/apple_app_store.db"));
    }
}
