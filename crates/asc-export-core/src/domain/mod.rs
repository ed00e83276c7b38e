pub mod availability;
pub mod catalog;
pub mod job;

pub use availability::AvailabilityMap;
pub use catalog::{
    MetricCatalog,
    MetricInfo,
};
pub use job::{
    CellOutcome,
    CellReport,
    ExportJob,
    ExportSummary,
};
