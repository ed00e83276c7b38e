use std::collections::BTreeMap;
use std::sync::Arc;

use asc_export_api::{
    AnalyticsProvider,
    DateWindow,
    Dimension,
    ExportResult,
    MetricRow,
    Session,
    TimeSeries,
    TimeSeriesQuery,
};
use chrono::NaiveDate;

/// Total reported for a group that has no data in the window
pub const NO_DATA_SENTINEL: f64 = -1.0;

/// App whose metrics are being exported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// Fetches one (metric, dimension) time series and flattens it into rows
pub struct MetricFetcher {
    provider: Arc<dyn AnalyticsProvider>,
}

impl MetricFetcher {
    pub fn new(provider: Arc<dyn AnalyticsProvider>) -> Self {
        Self { provider }
    }

    pub async fn fetch_metric(
        &self, session: &Session, app: AppRef<'_>, metric: &str, dimension: &Dimension,
        window: &DateWindow,
    ) -> ExportResult<Vec<MetricRow>> {
        tracing::info!("Getting {} by {}", metric, dimension);

        let query = TimeSeriesQuery {
            app_id: app.id.to_string(),
            metric: metric.to_string(),
            dimension: dimension.clone(),
            window: *window,
        };

        let series = self.provider.time_series(session, &query).await?;
        Ok(normalize(series, &app, metric, dimension))
    }
}

/// Flattens a time series into rows, dropping no-data groups and points
/// without a value
pub fn normalize(
    series: TimeSeries, app: &AppRef<'_>, metric: &str, dimension: &Dimension,
) -> Vec<MetricRow> {
    let mut rows = Vec::new();

    for result in series.results {
        if result.total == Some(NO_DATA_SENTINEL) {
            continue;
        }

        let label = match (dimension.is_grouped(), result.group_title) {
            (false, _) => None,
            (true, Some(title)) => Some(title),
            (true, None) => {
                tracing::warn!(
                    metric = %metric,
                    dimension = %dimension,
                    "Skipping grouped result without a group title"
                );
                continue;
            }
        };

        for point in result.points {
            let Some(value) = point.value else {
                continue;
            };

            rows.push(MetricRow {
                date: point.date,
                app_id: app.id.to_string(),
                app_name: app.name.to_string(),
                value,
                dimension_value: label.clone(),
            });
        }
    }

    rows
}

/// Groups rows by their partition date
pub fn group_by_date(rows: Vec<MetricRow>) -> BTreeMap<NaiveDate, Vec<MetricRow>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<MetricRow>> = BTreeMap::new();
    for row in rows {
        by_date.entry(row.date).or_default().push(row);
    }
    by_date
}
