use chrono::NaiveDate;
use thiserror::Error;

/// Export error types
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Date out of range; data exists for {data_start} to {data_end}")]
    DateRange {
        data_start: NaiveDate,
        data_end: NaiveDate,
    },

    #[error("{0} has incomplete data; set --allow-incomplete to allow this")]
    IncompleteData(NaiveDate),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Failed to get analytics metadata: {0}")]
    Metadata(#[source] Box<ExportError>),

    #[error("Failed to initialize warehouse: {0}")]
    SinkInit(String),

    #[error("Warehouse error: {0}")]
    Sink(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    /// HTTP status carried by an API error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ExportError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Rate limits, provider 500s and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::Api { status, .. } => matches!(status, 429 | 500),
            ExportError::Transport(_) => true,
            _ => false,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.http_status() == Some(429)
    }

    /// Innermost error when wrapped by `Metadata`
    pub fn root(&self) -> &ExportError {
        match self {
            ExportError::Metadata(inner) => inner.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ExportError {
        ExportError::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_retry_classification() {
        assert!(api(429).is_retryable());
        assert!(api(500).is_retryable());
        assert!(ExportError::Transport("connection reset".to_string()).is_retryable());

        assert!(!api(401).is_retryable());
        assert!(!api(403).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!api(502).is_retryable());
        assert!(!ExportError::Auth("nope".to_string()).is_retryable());
    }

    #[test]
    fn test_root_unwraps_metadata() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        let err = ExportError::Metadata(Box::new(ExportError::IncompleteData(date)));

        assert!(matches!(err.root(), ExportError::IncompleteData(d) if *d == date));
        assert!(err.to_string().contains("2020-01-03 has incomplete data"));
    }

    #[test]
    fn test_date_range_message() {
        let err = ExportError::DateRange {
            data_start: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            data_end: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Date out of range; data exists for 2020-01-02 to 2020-01-03"
        );
    }
}
