pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use application::{
    ExportOrchestrator,
    MetadataResolver,
    MetricFetcher,
    PartitionWriter,
};
use asc_export_api::{
    Authenticator,
    Credentials,
    ExportResult,
    Session,
    TwoFactorPrompt,
};
use asc_export_connect::AppStoreConnectClient;
pub use domain::{
    AvailabilityMap,
    CellOutcome,
    CellReport,
    ExportJob,
    ExportSummary,
    MetricCatalog,
};
pub use infrastructure::{
    ConfigLoader,
    ExportConfig,
    MemoryWarehouse,
    SqlWarehouse,
    WarehouseBackend,
};

/// Everything one export needs, wired from an [`ExportConfig`]
pub struct ExportContext {
    pub config: ExportConfig,

    pub client: Arc<AppStoreConnectClient>,

    pub orchestrator: ExportOrchestrator,
}

impl ExportContext {
    pub fn new(config: ExportConfig) -> anyhow::Result<Self> {
        let http_client = infrastructure::build_http_client(&config.api)?;
        let client = Arc::new(AppStoreConnectClient::new(
            http_client,
            config.api.endpoints(),
        ));

        let connector = infrastructure::connector_from_config(&config.warehouse);
        let orchestrator = ExportOrchestrator::new(client.clone(), connector)
            .with_policy(config.retry.backoff_policy());

        tracing::debug!(
            backend = %config.warehouse.backend,
            max_attempts = config.retry.max_attempts,
            "Export context ready"
        );

        Ok(Self {
            config,
            client,
            orchestrator,
        })
    }

    pub async fn login(
        &self, credentials: &Credentials, prompt: Option<&dyn TwoFactorPrompt>,
    ) -> ExportResult<Session> {
        self.client.login(credentials, prompt).await
    }

    pub async fn run(&self, session: &Session, job: &ExportJob) -> ExportResult<ExportSummary> {
        self.orchestrator.run(session, job).await
    }
}
