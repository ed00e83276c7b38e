use std::sync::Arc;

use asc_export_api::{
    AnalyticsProvider,
    BackoffPolicy,
    DateWindow,
    Dimension,
    ExportError,
    ExportResult,
    MetricRow,
    RetryState,
    Session,
    WarehouseConnector,
    WarehouseSink,
};
use tokio::task::JoinSet;
use tokio::time::sleep;

use super::fetcher::{
    group_by_date,
    AppRef,
    MetricFetcher,
};
use super::partition_writer::{
    CellWriteReport,
    PartitionWriter,
};
use super::resolver::MetadataResolver;
use crate::domain::{
    CellOutcome,
    CellReport,
    ExportJob,
    ExportSummary,
    MetricCatalog,
};

type WriteResult = (usize, ExportResult<CellWriteReport>);

/// Drives one export run: resolves what the provider offers, walks every
/// known (dimension, measure) cell in order, fetches it with backoff and
/// hands the rows to the partition writer.
///
/// Cells are fetched one at a time. Writes run in the background and are
/// drained before `run` returns.
pub struct ExportOrchestrator {
    provider: Arc<dyn AnalyticsProvider>,
    connector: Arc<dyn WarehouseConnector>,
    catalog: Arc<MetricCatalog>,
    policy: BackoffPolicy,
}

impl ExportOrchestrator {
    pub fn new(
        provider: Arc<dyn AnalyticsProvider>, connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        Self {
            provider,
            connector,
            catalog: Arc::new(MetricCatalog::app_store()),
            policy: BackoffPolicy::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: MetricCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Runs the export described by `job`.
    ///
    /// Fails only on fatal errors: a malformed window, an unauthenticated
    /// session, metadata resolution or sink initialisation. Abandoned cells
    /// and failed writes are reported in the summary.
    pub async fn run(&self, session: &Session, job: &ExportJob) -> ExportResult<ExportSummary> {
        let window = job.window()?;
        session.require_authenticated("export")?;

        tracing::info!(
            app_id = %job.app_id,
            app_name = %job.app_name,
            window = %window,
            "Exporting {} ({})",
            job.app_name,
            job.app_id
        );

        let availability = MetadataResolver::new(self.provider.clone())
            .resolve(session, &window, job.allow_incomplete)
            .await
            .map_err(|e| ExportError::Metadata(Box::new(e)))?;

        let sink = self.connect_sink(job).await?;
        let writer = Arc::new(PartitionWriter::new(
            sink,
            self.catalog.clone(),
            job.app_name.clone(),
        ));

        let fetcher = MetricFetcher::new(self.provider.clone());
        let app = AppRef {
            id: &job.app_id,
            name: &job.app_name,
        };

        let mut summary = ExportSummary::default();
        let mut writes: JoinSet<WriteResult> = JoinSet::new();

        for (dimension, measures) in availability.iter() {
            if !self.catalog.is_known_dimension(dimension) {
                tracing::debug!(dimension = %dimension, "Skipping dimension without a table");
                continue;
            }

            for metric in measures {
                if !self.catalog.is_known_metric(metric) {
                    tracing::debug!(metric = %metric, "Skipping unknown metric");
                    continue;
                }

                let (report, rows) = self
                    .fetch_cell(&fetcher, session, app, metric, dimension, &window)
                    .await;

                if !rows.is_empty() {
                    Self::spawn_write(
                        &mut writes,
                        writer.clone(),
                        metric.clone(),
                        dimension.clone(),
                        rows,
                        job.overwrite,
                    );
                }

                summary.cells.push(report);
            }
        }

        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.partitions_written += report.partitions_written;
                    summary.partitions_failed += report.partitions_failed;
                    summary.rows_written += report.rows_written;
                }
                Ok((partitions, Err(_))) => {
                    summary.partitions_failed += partitions;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Write task failed");
                }
            }
        }

        tracing::info!(
            cells = summary.cells_attempted(),
            abandoned = summary.cells_abandoned(),
            partitions = summary.partitions_written,
            failed_partitions = summary.partitions_failed,
            rows = summary.rows_written,
            fetch_attempts = summary.fetch_attempts(),
            "Export finished: {} of {} cells fetched, {} abandoned",
            summary.cells_succeeded(),
            summary.cells_attempted(),
            summary.cells_abandoned()
        );

        Ok(summary)
    }

    async fn connect_sink(&self, job: &ExportJob) -> ExportResult<Arc<dyn WarehouseSink>> {
        self.connector
            .connect(&job.target)
            .await
            .map_err(|e| match e {
                ExportError::SinkInit(_) => e,
                other => {
                    ExportError::SinkInit(format!("Failed to create warehouse client: {}", other))
                }
            })
    }

    /// Fetches one cell, retrying rate limits and transient failures.
    ///
    /// Every attempt is followed by `delay(attempt)`, successful or not.
    async fn fetch_cell(
        &self, fetcher: &MetricFetcher, session: &Session, app: AppRef<'_>, metric: &str,
        dimension: &Dimension, window: &DateWindow,
    ) -> (CellReport, Vec<MetricRow>) {
        let mut retry = RetryState::new(self.policy);

        loop {
            let attempt = retry.attempts();
            let delay = retry.begin_attempt();
            let result = fetcher
                .fetch_metric(session, app, metric, dimension, window)
                .await;

            let report = |outcome| CellReport {
                metric: metric.to_string(),
                dimension: dimension.clone(),
                attempts: retry.attempts(),
                delays: retry.delays().to_vec(),
                outcome,
            };

            let finished = match result {
                Ok(rows) if rows.is_empty() => {
                    tracing::info!(
                        metric = %metric,
                        dimension = %dimension,
                        "No data for {} by {}",
                        metric,
                        dimension
                    );
                    Some((report(CellOutcome::Empty), rows))
                }
                Ok(rows) => {
                    let partitions = group_by_date(rows.clone()).len();
                    tracing::info!(
                        metric = %metric,
                        dimension = %dimension,
                        rows = rows.len(),
                        "Got {} rows for {} by {}",
                        rows.len(),
                        metric,
                        dimension
                    );
                    let outcome = CellOutcome::Fetched {
                        rows: rows.len(),
                        partitions,
                    };
                    Some((report(outcome), rows))
                }
                Err(e) if e.is_retryable() && !retry.is_exhausted() => {
                    tracing::warn!(
                        metric = %metric,
                        dimension = %dimension,
                        attempt = attempt + 1,
                        retry_in_secs = delay.as_secs_f64(),
                        error = %e,
                        "{} getting {} by {}, retrying in {:?}",
                        if e.is_rate_limit() { "Rate limited" } else { "Transient error" },
                        metric,
                        dimension,
                        delay
                    );
                    None
                }
                Err(e) => {
                    let reason = if e.is_retryable() {
                        format!("gave up after {} attempts: {}", retry.attempts(), e)
                    } else {
                        e.to_string()
                    };
                    tracing::error!(
                        metric = %metric,
                        dimension = %dimension,
                        attempts = retry.attempts(),
                        "Failed to get {} by {}: {}",
                        metric,
                        dimension,
                        reason
                    );
                    let outcome = CellOutcome::Abandoned {
                        attempts: retry.attempts(),
                        reason,
                    };
                    Some((report(outcome), Vec::new()))
                }
            };

            sleep(delay).await;

            if let Some(done) = finished {
                return done;
            }
        }
    }

    fn spawn_write(
        writes: &mut JoinSet<WriteResult>, writer: Arc<PartitionWriter>, metric: String,
        dimension: Dimension, rows: Vec<MetricRow>, overwrite: bool,
    ) {
        writes.spawn(async move {
            let by_date = group_by_date(rows);
            let partitions = by_date.len();

            let result = writer
                .write_cell(&metric, &dimension, by_date, overwrite)
                .await;

            match &result {
                Ok(report) => tracing::info!(
                    table = %report.table,
                    partitions = report.partitions_written,
                    failed = report.partitions_failed,
                    "Finished writing to table for {} by {}",
                    metric,
                    dimension
                ),
                Err(e) => tracing::error!(
                    metric = %metric,
                    dimension = %dimension,
                    error = %e,
                    "Failed to write {} by {}",
                    metric,
                    dimension
                ),
            }

            (partitions, result)
        });
    }
}
