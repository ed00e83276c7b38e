pub mod fetcher;
pub mod orchestrator;
pub mod partition_writer;
pub mod resolver;

pub use fetcher::{
    group_by_date,
    normalize,
    AppRef,
    MetricFetcher,
    NO_DATA_SENTINEL,
};
pub use orchestrator::ExportOrchestrator;
pub use partition_writer::{
    CellWriteReport,
    PartitionWriter,
};
pub use resolver::{
    check_window,
    MetadataResolver,
};
