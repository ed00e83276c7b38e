pub mod config;
pub mod http_client;
pub mod warehouse;

pub use config::{
    ApiConfig,
    ConfigLoadError,
    ConfigLoader,
    ExportConfig,
    GeneralConfig,
    RetryConfig,
    WarehouseBackend,
    WarehouseConfig,
};
pub use http_client::{
    build_http_client,
    install_crypto_provider,
};
pub use warehouse::{
    connector_from_config,
    MemoryWarehouse,
    SqlWarehouse,
};
