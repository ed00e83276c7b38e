use std::time::Duration;

use asc_export_api::{
    ExportError,
    ExportResult,
};
use reqwest::Client;

use super::config::ApiConfig;

const HTTP_POOL_SIZE_ENV: &str = "ASC_EXPORT_HTTP_POOL_SIZE";

/// Installs the ring crypto provider for rustls. Safe to call more than once.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("rustls crypto provider already installed");
    }
}

/// Builds the HTTP client shared by the sign-in and analytics calls
pub fn build_http_client(config: &ApiConfig) -> ExportResult<Client> {
    install_crypto_provider();

    let pool_size = std::env::var(HTTP_POOL_SIZE_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(pool_size)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .build()
        .map_err(|e| ExportError::Internal(format!("Failed to create HTTP client: {}", e)))
}
