pub mod loader;
pub mod schema;

pub use loader::{
    ConfigLoadError,
    ConfigLoadResult,
    ConfigLoader,
};
pub use schema::{
    ApiConfig,
    ExportConfig,
    GeneralConfig,
    RetryConfig,
    WarehouseBackend,
    WarehouseConfig,
};
