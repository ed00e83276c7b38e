use std::fmt;

use chrono::NaiveDate;
use secrecy::{
    ExposeSecret,
    SecretString,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    ExportError,
    ExportResult,
};

/// Account credentials used for the initial sign-in
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Authenticated session: the account cookie plus the session cookie.
///
/// A session is never mutated; re-authenticating produces a new one.
#[derive(Debug)]
pub struct Session {
    account: SecretString,
    session: SecretString,
}

impl Session {
    pub fn new(account: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            account: SecretString::from(account.into()),
            session: SecretString::from(session.into()),
        }
    }

    /// Local precondition check, no remote call
    pub fn is_authenticated(&self) -> bool {
        !self.account.expose_secret().is_empty() && !self.session.expose_secret().is_empty()
    }

    pub fn require_authenticated(&self, operation: &str) -> ExportResult<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ExportError::Auth(format!(
                "{operation} requires authentication; log in first"
            )))
        }
    }

    /// Value for the `Cookie` request header
    pub fn cookie_header(&self) -> String {
        format!(
            "myacinfo={}; itctx={}",
            self.account.expose_secret(),
            self.session.expose_secret()
        )
    }
}

/// Grouping axis of a time series. `NoGrouping` selects the ungrouped totals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    NoGrouping,
    Key(String),
}

impl Dimension {
    pub fn key(key: impl Into<String>) -> Self {
        Dimension::Key(key.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Dimension::NoGrouping => None,
            Dimension::Key(key) => Some(key),
        }
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self, Dimension::Key(_))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::NoGrouping => write!(f, "total"),
            Dimension::Key(key) => write!(f, "{key}"),
        }
    }
}

/// Inclusive, validated date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> ExportResult<Self> {
        if start > end {
            return Err(ExportError::InvalidInput(
                "Start date must be before end date".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Parses two `YYYY-MM-DD` dates
    pub fn parse(start: &str, end: &str) -> ExportResult<Self> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
                ExportError::InvalidInput(
                    "Execution dates must be given in the format YYYY-MM-DD".to_string(),
                )
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        if let Some(i) = value.as_i64() {
            Some(MetricValue::Integer(i))
        } else {
            value.as_f64().map(MetricValue::Float)
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            MetricValue::Integer(i) => *i,
            MetricValue::Float(f) => f.round() as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Integer(i) => *i as f64,
            MetricValue::Float(f) => *f,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(i) => write!(f, "{i}"),
            MetricValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One normalized record of a metric time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub app_id: String,
    pub app_name: String,
    pub value: MetricValue,
    /// Group label; `None` for ungrouped totals
    pub dimension_value: Option<String>,
}

/// Global provider configuration returned by the settings endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub data_start_date: NaiveDate,
    pub data_end_date: NaiveDate,
    pub dimensions: Vec<DimensionInfo>,
    pub measures: Vec<MeasureInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionInfo {
    pub id: i64,
    pub key: String,
    pub groupable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureInfo {
    pub key: String,
    /// Ids of the dimensions this measure declares support for
    pub dimension_ids: Vec<i64>,
}

/// A single time-series request for one (metric, dimension) cell
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesQuery {
    pub app_id: String,
    pub metric: String,
    pub dimension: Dimension,
    pub window: DateWindow,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub results: Vec<SeriesResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesResult {
    pub group_title: Option<String>,
    pub total: Option<f64>,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: Option<MetricValue>,
}

/// Warehouse destination of an export run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkTarget {
    pub project: String,
    pub dataset: String,
}
