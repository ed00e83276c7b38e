pub mod error;
pub mod provider;
pub mod schema;
pub mod sink;
pub mod types;
pub mod utils;

pub use error::{
    ExportError,
    ExportResult,
};
pub use provider::{
    AnalyticsProvider,
    Authenticator,
    TwoFactorPrompt,
};
pub use schema::{
    ColumnDefinition,
    ColumnType,
    TableSchema,
    WriteMode,
};
pub use sink::{
    WarehouseConnector,
    WarehouseSink,
};
pub use types::{
    Credentials,
    DateWindow,
    Dimension,
    DimensionInfo,
    MeasureInfo,
    MetricRow,
    MetricValue,
    ProviderSettings,
    SeriesPoint,
    SeriesResult,
    Session,
    SinkTarget,
    TimeSeries,
    TimeSeriesQuery,
};
pub use utils::{
    BackoffPolicy,
    RetryState,
};
