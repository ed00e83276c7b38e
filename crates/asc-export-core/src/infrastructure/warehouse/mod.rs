mod database;
mod memory;
mod sql;

use std::sync::Arc;

use asc_export_api::WarehouseConnector;

pub use database::{
    init_postgres_dataset,
    init_sqlite_dataset,
};
pub use memory::{
    MemoryDataset,
    MemoryWarehouse,
};
pub use sql::{
    DatabasePool,
    SqlBackend,
    SqlDataset,
    SqlWarehouse,
    StoredRow,
};

use super::config::{
    WarehouseBackend,
    WarehouseConfig,
};

/// Builds the warehouse connector selected by the configuration
pub fn connector_from_config(config: &WarehouseConfig) -> Arc<dyn WarehouseConnector> {
    tracing::debug!("{}", config.summary());

    match config.backend {
        WarehouseBackend::Sqlite => Arc::new(SqlWarehouse::new(
            SqlBackend::Sqlite {
                data_dir: config.data_dir(),
            },
            config.max_concurrent_loads,
        )),
        WarehouseBackend::Postgres => Arc::new(SqlWarehouse::new(
            SqlBackend::Postgres {
                connection_string: config.connection_string.clone(),
            },
            config.max_concurrent_loads,
        )),
        WarehouseBackend::Memory => Arc::new(MemoryWarehouse::new()),
    }
}
