use std::path::{
    Path,
    PathBuf,
};

use thiserror::Error;

use super::schema::{
    ExportConfig,
    WarehouseBackend,
};

pub const CONFIG_PATH_ENV: &str = "ASC_EXPORT_CONFIG_PATH";
pub const WAREHOUSE_BACKEND_ENV: &str = "ASC_EXPORT_WAREHOUSE_BACKEND";
pub const DATA_DIR_ENV: &str = "ASC_EXPORT_DATA_DIR";
pub const DATABASE_URL_ENV: &str = "ASC_EXPORT_DATABASE_URL";
pub const MAX_ATTEMPTS_ENV: &str = "ASC_EXPORT_MAX_ATTEMPTS";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ConfigLoadResult<T> = Result<T, ConfigLoadError>;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn discover_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            tracing::debug!("Using config path from {}: {}", CONFIG_PATH_ENV, path);
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .map(|dir| dir.join("asc-export").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("asc-export.toml"))
    }

    /// Loads `path`, or the discovered path when `None`, and applies the
    /// overrides from `lookup` without validating.
    ///
    /// A missing discovered file yields the defaults; a missing explicit
    /// file is an error. Callers layering further overrides validate once
    /// they are done.
    pub fn load_unvalidated(
        path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigLoadResult<ExportConfig> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let discovered = Self::discover_config_path();
                if discovered.exists() {
                    Self::load(&discovered)?
                } else {
                    tracing::debug!(
                        "No config file at {}, using defaults",
                        discovered.display()
                    );
                    ExportConfig::default()
                }
            }
        };

        Self::apply_overrides(&mut config, lookup)?;

        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigLoadResult<ExportConfig> {
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigLoadResult<ExportConfig> {
        let config: ExportConfig = toml::from_str(content)?;

        tracing::debug!(
            backend = %config.warehouse.backend,
            max_attempts = config.retry.max_attempts,
            "Loaded config"
        );

        Ok(config)
    }

    /// Applies overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides(
        config: &mut ExportConfig, lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigLoadResult<()> {
        if let Some(backend) = lookup(WAREHOUSE_BACKEND_ENV) {
            config.warehouse.backend = backend
                .parse::<WarehouseBackend>()
                .map_err(ConfigLoadError::InvalidConfig)?;
        }

        if let Some(data_dir) = lookup(DATA_DIR_ENV) {
            config.warehouse.data_dir = data_dir;
        }

        if let Some(url) = lookup(DATABASE_URL_ENV) {
            config.warehouse.connection_string = url;
        }

        if let Some(attempts) = lookup(MAX_ATTEMPTS_ENV) {
            config.retry.max_attempts = attempts.trim().parse().map_err(|e| {
                ConfigLoadError::InvalidConfig(format!(
                    "{} must be a positive integer: {}",
                    MAX_ATTEMPTS_ENV, e
                ))
            })?;
        }

        Ok(())
    }
}
