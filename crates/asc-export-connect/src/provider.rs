//! `AnalyticsProvider` implementation backed by the App Store Connect API

use asc_export_api::{
    AnalyticsProvider,
    ExportResult,
    ProviderSettings,
    Session,
    TimeSeries,
    TimeSeriesQuery,
};
use async_trait::async_trait;

use crate::{
    client::AppStoreConnectClient,
    mapper,
};

#[async_trait]
impl AnalyticsProvider for AppStoreConnectClient {
    async fn settings(&self, session: &Session) -> ExportResult<ProviderSettings> {
        session.require_authenticated("settings")?;

        let response = self.fetch_settings(session).await?;
        mapper::settings_from_response(response)
    }

    async fn time_series(
        &self, session: &Session, query: &TimeSeriesQuery,
    ) -> ExportResult<TimeSeries> {
        session.require_authenticated("time_series")?;

        let response = self.fetch_time_series(session, query).await?;
        mapper::time_series_from_response(response, &query.metric)
    }
}
