use std::path::PathBuf;
use std::time::Duration;

use asc_export_api::BackoffPolicy;
use asc_export_connect::{
    Endpoints,
    DEFAULT_ANALYTICS_BASE_URL,
    DEFAULT_AUTH_BASE_URL,
    DEFAULT_SESSION_URL,
    DEFAULT_WIDGET_KEY,
};
use serde::{
    Deserialize,
    Serialize,
};

pub(super) const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub(super) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub(super) const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub(super) const DEFAULT_BASE_DELAY_SECS: u64 = 3;

pub(super) const DEFAULT_STEP_DELAY_SECS: u64 = 2;

pub(super) const DEFAULT_MAX_CONCURRENT_LOADS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    #[default]
    Sqlite,
    Postgres,
    Memory,
}

impl WarehouseBackend {
    pub fn requires_postgres(&self) -> bool {
        matches!(self, Self::Postgres)
    }
}

impl std::fmt::Display for WarehouseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for WarehouseBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(format!(
                "Unknown warehouse backend: {}. Valid options: sqlite, postgres, memory",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExportConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub warehouse: WarehouseConfig,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.api.validate()?;
        self.retry.validate()?;
        self.warehouse.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GeneralConfig {
    /// Default tracing filter, used when `RUST_LOG` is not set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,

    #[serde(default = "default_session_url")]
    pub session_url: String,

    #[serde(default = "default_analytics_base_url")]
    pub analytics_base_url: String,

    #[serde(default = "default_widget_key")]
    pub widget_key: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            auth_base_url: default_auth_base_url(),
            session_url: default_session_url(),
            analytics_base_url: default_analytics_base_url(),
            widget_key: default_widget_key(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            auth_base_url: self.auth_base_url.clone(),
            session_url: self.session_url.clone(),
            analytics_base_url: self.analytics_base_url.clone(),
            widget_key: self.widget_key.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self) -> Result<(), String> {
        for (field, url) in [
            ("api.auth_base_url", &self.auth_base_url),
            ("api.session_url", &self.session_url),
            ("api.analytics_base_url", &self.analytics_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("{} must be an http(s) URL, got '{}'", field, url));
            }
        }

        if self.widget_key.trim().is_empty() {
            return Err("api.widget_key must not be empty".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("api.timeout_secs must be at least 1".to_string());
        }

        Ok(())
    }
}

fn default_auth_base_url() -> String {
    DEFAULT_AUTH_BASE_URL.to_string()
}

fn default_session_url() -> String {
    DEFAULT_SESSION_URL.to_string()
}

fn default_analytics_base_url() -> String {
    DEFAULT_ANALYTICS_BASE_URL.to_string()
}

fn default_widget_key() -> String {
    DEFAULT_WIDGET_KEY.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Per-cell fetch retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_step_delay_secs")]
    pub step_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            step_delay_secs: default_step_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.base_delay_secs),
            Duration::from_secs(self.step_delay_secs),
        )
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_secs() -> u64 {
    DEFAULT_BASE_DELAY_SECS
}

fn default_step_delay_secs() -> u64 {
    DEFAULT_STEP_DELAY_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub backend: WarehouseBackend,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connection_string: String,

    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::default(),
            data_dir: String::new(),
            connection_string: String::new(),
            max_concurrent_loads: default_max_concurrent_loads(),
        }
    }
}

impl WarehouseConfig {
    pub fn data_dir(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.data_dir)
        }
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("asc-export"))
            .unwrap_or_else(|| PathBuf::from(".asc-export"))
    }

    pub fn summary(&self) -> String {
        format!("Warehouse: {} backend", self.backend)
    }

    fn validate(&self) -> Result<(), String> {
        if self.backend.requires_postgres() && self.connection_string.is_empty() {
            return Err("PostgreSQL backend selected but connection_string is empty".to_string());
        }

        if self.max_concurrent_loads == 0 {
            return Err("warehouse.max_concurrent_loads must be at least 1".to_string());
        }

        Ok(())
    }
}

fn default_max_concurrent_loads() -> usize {
    DEFAULT_MAX_CONCURRENT_LOADS
}
