use std::sync::Arc;

use asc_export_api::{
    AnalyticsProvider,
    DateWindow,
    ExportError,
    ExportResult,
    ProviderSettings,
    Session,
};

use crate::domain::AvailabilityMap;

/// Turns the provider settings into the measure-by-dimension availability
/// map for one export window
pub struct MetadataResolver {
    provider: Arc<dyn AnalyticsProvider>,
}

impl MetadataResolver {
    pub fn new(provider: Arc<dyn AnalyticsProvider>) -> Self {
        Self { provider }
    }

    pub async fn resolve(
        &self, session: &Session, window: &DateWindow, allow_incomplete: bool,
    ) -> ExportResult<AvailabilityMap> {
        let settings = self.provider.settings(session).await?;

        check_window(&settings, window, allow_incomplete)?;

        let availability = AvailabilityMap::from_settings(&settings);
        tracing::debug!(
            dimensions = availability.len(),
            measures = settings.measures.len(),
            "Resolved analytics metadata"
        );

        Ok(availability)
    }
}

/// Checks `window` against the provider's published data range
pub fn check_window(
    settings: &ProviderSettings, window: &DateWindow, allow_incomplete: bool,
) -> ExportResult<()> {
    if window.end() > settings.data_end_date || window.start() < settings.data_start_date {
        return Err(ExportError::DateRange {
            data_start: settings.data_start_date,
            data_end: settings.data_end_date,
        });
    }

    if window.end() == settings.data_end_date {
        if !allow_incomplete {
            return Err(ExportError::IncompleteData(settings.data_end_date));
        }
        tracing::warn!("{} has incomplete data", settings.data_end_date);
    }

    Ok(())
}
