//! App Store Connect client for asc-export
//!
//! This crate talks to the Apple sign-in service and the App Store Connect
//! analytics API:
//! - Sign in with username and password, including SMS two-step verification
//! - Fetch the analytics settings (data range, dimensions, measures)
//! - Fetch daily time series for one measure, optionally grouped
//!
//! # Architecture
//!
//! - `client` - HTTP client and request helpers
//! - `auth` - Sign-in flow (`Authenticator` implementation)
//! - `provider` - `AnalyticsProvider` implementation
//! - `types` - API request and response types
//! - `mapper` - Data mapping utilities
//! - `config` - Endpoints and cookie parsing
//!
//! # Example Usage
//!
//! ```no_run
//! use asc_export_api::{Authenticator, Credentials};
//! use asc_export_connect::{AppStoreConnectClient, Endpoints};
//!
//! # async fn run() -> asc_export_api::ExportResult<()> {
//! let client = AppStoreConnectClient::new(reqwest::Client::new(), Endpoints::default());
//! let session = client
//!     .login(&Credentials::new("user@example.com", "secret"), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod config;
mod mapper;
mod provider;
mod types;

pub use client::AppStoreConnectClient;
pub use config::{
    Endpoints,
    DEFAULT_ANALYTICS_BASE_URL,
    DEFAULT_AUTH_BASE_URL,
    DEFAULT_SESSION_URL,
    DEFAULT_WIDGET_KEY,
};
