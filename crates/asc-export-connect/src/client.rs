//! App Store Connect API client and methods

use asc_export_api::{
    ExportError,
    ExportResult,
    Session,
    TimeSeriesQuery,
};
use reqwest::{
    header::{
        ACCEPT,
        CONTENT_TYPE,
        COOKIE,
    },
    Client,
    RequestBuilder,
    Response,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    config::Endpoints,
    mapper,
    types,
};

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const ACCEPT_VALUE: &str = "application/json, text/javascript, */*";
const REQUESTED_BY_HEADER: &str = "X-Requested-By";
const REQUESTED_BY_VALUE: &str = "dev.apple.com";

/// HTTP client for the App Store Connect sign-in and analytics services.
///
/// Holds no session state; every analytics call takes the [`Session`] it
/// should run under.
#[derive(Clone)]
pub struct AppStoreConnectClient {
    pub(crate) client: Client,
    pub(crate) endpoints: Endpoints,
}

impl AppStoreConnectClient {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Adds the headers shared by every request
    pub(crate) fn with_defaults(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ACCEPT, ACCEPT_VALUE)
    }

    pub(crate) async fn send(request: RequestBuilder, what: &str) -> ExportResult<Response> {
        request
            .send()
            .await
            .map_err(|e| ExportError::Transport(format!("{what}: {e}")))
    }

    /// Fetches the global analytics settings
    pub async fn fetch_settings(&self, session: &Session) -> ExportResult<types::SettingsResponse> {
        let url = self.endpoints.settings_url();
        debug!(url = %url, "Fetching analytics settings");

        let request = self
            .with_defaults(self.client.get(&url))
            .header(COOKIE, session.cookie_header());
        let response = Self::send(request, "Could not get API settings").await?;

        handle_response(response, "Could not get API settings").await
    }

    /// Fetches one time series for a (metric, dimension) pair
    pub async fn fetch_time_series(
        &self, session: &Session, query: &TimeSeriesQuery,
    ) -> ExportResult<types::TimeSeriesResponse> {
        let url = self.endpoints.time_series_url();
        debug!(
            metric = %query.metric,
            dimension = %query.dimension,
            window = %query.window,
            "Fetching time series"
        );

        let request = self
            .with_defaults(self.client.post(&url))
            .header(COOKIE, session.cookie_header())
            .header(REQUESTED_BY_HEADER, REQUESTED_BY_VALUE)
            .json(&mapper::time_series_request(query));
        let response = Self::send(request, "Could not get metrics").await?;

        handle_response(response, "Could not get metrics").await
    }
}

/// Turns a non-success response into an API error carrying its status code
/// and any `errors` payload, or decodes the body on success
pub(crate) async fn handle_response<T: DeserializeOwned>(
    response: Response, what: &str,
) -> ExportResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ExportError::Transport(format!("{what}: failed to read response: {e}")))?;

    if !status.is_success() {
        let details = serde_json::from_str::<types::ErrorPayload>(&body)
            .ok()
            .and_then(|payload| payload.errors)
            .map(|errors| errors.to_string())
            .unwrap_or_default();

        return Err(ExportError::Api {
            status: status.as_u16(),
            message: format!(
                "{what}: {} {} {details}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
            .trim_end()
            .to_string(),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ExportError::Serialization(format!("{what}: invalid response body: {e}")))
}
