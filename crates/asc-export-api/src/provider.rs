use async_trait::async_trait;

use crate::error::ExportResult;
use crate::types::*;

/// Analytics provider - the remote source of settings and time series
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    /// Fetch global settings: valid data range plus dimension and measure catalogs
    async fn settings(&self, session: &Session) -> ExportResult<ProviderSettings>;

    /// Fetch one daily time series.
    ///
    /// A non-success response must surface as `ExportError::Api` carrying the
    /// HTTP status; send or read failures as `ExportError::Transport`.
    async fn time_series(&self, session: &Session, query: &TimeSeriesQuery)
        -> ExportResult<TimeSeries>;
}

/// Produces a `Session` from account credentials
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Sign in, answering a two-factor challenge through `prompt` when the
    /// provider requires one
    async fn login(
        &self, credentials: &Credentials, prompt: Option<&dyn TwoFactorPrompt>,
    ) -> ExportResult<Session>;
}

/// Out-of-band source of one-time verification codes
#[async_trait]
pub trait TwoFactorPrompt: Send + Sync {
    async fn request_code(&self) -> ExportResult<String>;
}
