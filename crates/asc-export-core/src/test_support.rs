use std::collections::{
    HashMap,
    VecDeque,
};
use std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Mutex,
};
use std::time::Duration;

use asc_export_api::{
    AnalyticsProvider,
    BackoffPolicy,
    Dimension,
    DimensionInfo,
    ExportError,
    ExportResult,
    MeasureInfo,
    MetricValue,
    ProviderSettings,
    SeriesPoint,
    SeriesResult,
    Session,
    SinkTarget,
    TimeSeries,
    TimeSeriesQuery,
};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::ExportJob;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Series(TimeSeries),
    Status(u16),
    Transport,
}

impl Reply {
    fn into_result(self) -> ExportResult<TimeSeries> {
        match self {
            Reply::Series(series) => Ok(series),
            Reply::Status(status) => Err(ExportError::Api {
                status,
                message: format!("stubbed {status}"),
            }),
            Reply::Transport => Err(ExportError::Transport("connection reset".to_string())),
        }
    }
}

/// Scripted analytics provider recording every time-series query
pub(crate) struct StubProvider {
    settings: ProviderSettings,
    scripts: Mutex<HashMap<(String, Dimension), VecDeque<Reply>>>,
    fallback: Reply,
    calls: Mutex<Vec<TimeSeriesQuery>>,
    settings_calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            scripts: Mutex::new(HashMap::new()),
            fallback: Reply::Series(TimeSeries::default()),
            calls: Mutex::new(Vec::new()),
            settings_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    pub fn script(self, metric: &str, dimension: Dimension, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((metric.to_string(), dimension), replies.into());
        self
    }

    pub fn calls(&self) -> Vec<TimeSeriesQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, metric: &str, dimension: &Dimension) -> usize {
        self.calls()
            .iter()
            .filter(|q| q.metric == metric && &q.dimension == dimension)
            .count()
    }

    pub fn settings_calls(&self) -> usize {
        self.settings_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsProvider for StubProvider {
    async fn settings(&self, session: &Session) -> ExportResult<ProviderSettings> {
        session.require_authenticated("settings")?;
        self.settings_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.settings.clone())
    }

    async fn time_series(
        &self, session: &Session, query: &TimeSeriesQuery,
    ) -> ExportResult<TimeSeries> {
        session.require_authenticated("time_series")?;
        self.calls.lock().unwrap().push(query.clone());

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&(query.metric.clone(), query.dimension.clone()))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone());

        reply.into_result()
    }
}

pub(crate) fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub(crate) fn session() -> Session {
    Session::new("account", "session")
}

pub(crate) fn fast_policy() -> BackoffPolicy {
    BackoffPolicy::new(5, Duration::from_millis(1), Duration::from_millis(1))
}

/// Settings with a 2020-01-02..2020-01-03 data window.
///
/// Groupable: platform (2), appVersion (3), pageType (4, unknown to the
/// catalog). Dimension 1 is not groupable.
pub(crate) fn settings() -> ProviderSettings {
    let dimension = |id, key: &str, groupable| DimensionInfo {
        id,
        key: key.to_string(),
        groupable,
    };
    let measure = |key: &str, ids: &[i64]| MeasureInfo {
        key: key.to_string(),
        dimension_ids: ids.to_vec(),
    };

    ProviderSettings {
        data_start_date: date("2020-01-02"),
        data_end_date: date("2020-01-03"),
        dimensions: vec![
            dimension(1, "date", false),
            dimension(2, "platform", true),
            dimension(3, "appVersion", true),
            dimension(4, "pageType", true),
        ],
        measures: vec![
            measure("installs", &[1, 2, 3, 4]),
            measure("units", &[2]),
            measure("benchmarks", &[2]),
        ],
    }
}

/// One result with a daily value per date
pub(crate) fn series(group: Option<&str>, values: &[(&str, i64)]) -> TimeSeries {
    TimeSeries {
        results: vec![SeriesResult {
            group_title: group.map(str::to_string),
            total: Some(values.iter().map(|(_, v)| *v as f64).sum()),
            points: values
                .iter()
                .map(|(d, v)| SeriesPoint {
                    date: date(d),
                    value: Some(MetricValue::Integer(*v)),
                })
                .collect(),
        }],
    }
}

pub(crate) fn target() -> SinkTarget {
    SinkTarget {
        project: "test-project".to_string(),
        dataset: "apple_app_store".to_string(),
    }
}

pub(crate) fn job(start: &str, end: &str) -> ExportJob {
    ExportJob {
        target: target(),
        app_id: "989804926".to_string(),
        app_name: "Firefox".to_string(),
        start_date: start.to_string(),
        end_date: end.to_string(),
        overwrite: false,
        allow_incomplete: false,
    }
}
