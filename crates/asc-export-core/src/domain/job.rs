use std::time::Duration;

use asc_export_api::{
    DateWindow,
    Dimension,
    ExportResult,
    SinkTarget,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Parameters of one export run. Immutable for the duration of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub target: SinkTarget,
    pub app_id: String,
    pub app_name: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`
    pub end_date: String,
    pub overwrite: bool,
    pub allow_incomplete: bool,
}

impl ExportJob {
    pub fn window(&self) -> ExportResult<DateWindow> {
        DateWindow::parse(&self.start_date, &self.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellOutcome {
    /// Rows were fetched and handed to the writer
    Fetched { rows: usize, partitions: usize },
    /// The fetch succeeded but returned nothing to write
    Empty,
    Abandoned { attempts: u32, reason: String },
}

/// Result of one (measure, dimension) cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellReport {
    pub metric: String,
    pub dimension: Dimension,
    pub attempts: u32,
    /// Pause taken after each attempt
    pub delays: Vec<Duration>,
    pub outcome: CellOutcome,
}

impl CellReport {
    pub fn is_abandoned(&self) -> bool {
        matches!(self.outcome, CellOutcome::Abandoned { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub cells: Vec<CellReport>,
    pub partitions_written: usize,
    pub partitions_failed: usize,
    pub rows_written: u64,
}

impl ExportSummary {
    pub fn cells_attempted(&self) -> usize {
        self.cells.len()
    }

    pub fn cells_succeeded(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_abandoned()).count()
    }

    pub fn cells_abandoned(&self) -> usize {
        self.cells.iter().filter(|c| c.is_abandoned()).count()
    }

    pub fn fetch_attempts(&self) -> u32 {
        self.cells.iter().map(|c| c.attempts).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(start: &str, end: &str) -> ExportJob {
        ExportJob {
            target: SinkTarget {
                project: "moz-fx-data".to_string(),
                dataset: "apple_app_store".to_string(),
            },
            app_id: "989804926".to_string(),
            app_name: "Firefox".to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
            overwrite: false,
            allow_incomplete: false,
        }
    }

    #[test]
    fn test_job_window() {
        assert!(job("2020-01-01", "2020-01-02").window().is_ok());
        assert!(job("2020-01-02", "2020-01-01").window().is_err());
        assert!(job("20200101", "2020-01-02").window().is_err());
    }

    #[test]
    fn test_summary_counts() {
        let summary = ExportSummary {
            cells: vec![
                CellReport {
                    metric: "installs".to_string(),
                    dimension: Dimension::NoGrouping,
                    attempts: 1,
                    delays: vec![Duration::from_secs(5)],
                    outcome: CellOutcome::Fetched {
                        rows: 2,
                        partitions: 2,
                    },
                },
                CellReport {
                    metric: "units".to_string(),
                    dimension: Dimension::key("platform"),
                    attempts: 5,
                    delays: [5, 7, 11, 19, 35].map(Duration::from_secs).to_vec(),
                    outcome: CellOutcome::Abandoned {
                        attempts: 5,
                        reason: "rate limited".to_string(),
                    },
                },
                CellReport {
                    metric: "crashes".to_string(),
                    dimension: Dimension::NoGrouping,
                    attempts: 1,
                    delays: vec![Duration::from_secs(5)],
                    outcome: CellOutcome::Empty,
                },
            ],
            ..ExportSummary::default()
        };

        assert_eq!(summary.cells_attempted(), 3);
        assert_eq!(summary.cells_succeeded(), 2);
        assert_eq!(summary.cells_abandoned(), 1);
        assert_eq!(summary.fetch_attempts(), 7);
    }
}
