use std::path::PathBuf;
use std::time::Duration;

use asc_export_api::{
    ExportError,
    ExportResult,
};
use sqlx::postgres::{
    PgPool,
    PgPoolOptions,
};
use sqlx::sqlite::{
    SqliteConnectOptions,
    SqlitePoolOptions,
};
use sqlx::{
    Executor,
    SqlitePool,
};

/// Quotes a table, column or schema name. Only ASCII letters, digits and
/// underscores are accepted.
pub(crate) fn quote_ident(name: &str) -> ExportResult<String> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(ExportError::InvalidInput(format!(
            "'{}' is not a valid warehouse identifier",
            name
        )));
    }

    Ok(format!("\"{}\"", name))
}

pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Opens (creating if missing) the SQLite file backing one dataset
pub async fn init_sqlite_dataset(path: PathBuf, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations/sqlite")
        .set_ignore_missing(true)
        .run(&pool)
        .await?;

    pool.execute("PRAGMA cache_size = -64000").await?; // 64MB cache
    pool.execute("PRAGMA temp_store = MEMORY").await?;
    pool.execute("PRAGMA wal_autocheckpoint = 1000").await?;

    Ok(pool)
}

/// Connects to PostgreSQL with `schema` as the search path, creating the
/// schema first when it does not exist. Returns the pool and whether the
/// schema was created.
pub async fn init_postgres_dataset(
    connection_string: &str, schema: &str, max_connections: u32,
) -> anyhow::Result<(PgPool, bool)> {
    let quoted = quote_ident(schema)?;

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(connection_string)
        .await?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
    )
    .bind(schema)
    .fetch_one(&admin)
    .await?;

    if !exists {
        let create = format!("CREATE SCHEMA IF NOT EXISTS {}", quoted);
        sqlx::query(&create).execute(&admin).await?;
    }
    admin.close().await;

    let search_path = format!("SET search_path TO {}", quoted);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .after_connect(move |conn, _meta| {
            let search_path = search_path.clone();
            Box::pin(async move {
                sqlx::query(&search_path).execute(conn).await?;
                Ok(())
            })
        })
        .connect(connection_string)
        .await?;

    sqlx::migrate!("./migrations/postgres")
        .set_ignore_missing(true)
        .run(&pool)
        .await?;

    Ok((pool, !exists))
}
