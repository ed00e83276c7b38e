//! Endpoint configuration and cookie helpers

use asc_export_api::{
    ExportError,
    ExportResult,
};
use regex::Regex;
use reqwest::header::{
    HeaderMap,
    SET_COOKIE,
};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://idmsa.apple.com/appleauth/auth";
pub const DEFAULT_SESSION_URL: &str = "https://appstoreconnect.apple.com/olympus/v1/session";
pub const DEFAULT_ANALYTICS_BASE_URL: &str = "https://appstoreconnect.apple.com/analytics/api/v1";
pub const DEFAULT_WIDGET_KEY: &str =
    "e0b80c3bf78523bfe80974d320935bfa30add02e1bff88ec2166c6bd5a706c42";

pub(crate) const ACCOUNT_COOKIE: &str = "myacinfo";
pub(crate) const SESSION_COOKIE: &str = "itctx";

/// Base URLs of the services involved in an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_base_url: String,
    pub session_url: String,
    pub analytics_base_url: String,
    pub widget_key: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            session_url: DEFAULT_SESSION_URL.to_string(),
            analytics_base_url: DEFAULT_ANALYTICS_BASE_URL.to_string(),
            widget_key: DEFAULT_WIDGET_KEY.to_string(),
        }
    }
}

impl Endpoints {
    pub fn signin_url(&self) -> String {
        format!(
            "{}/signin?isRememberMeEnabled=true",
            trim(&self.auth_base_url)
        )
    }

    pub fn verify_code_url(&self) -> String {
        format!("{}/verify/phone/securitycode", trim(&self.auth_base_url))
    }

    pub fn settings_url(&self) -> String {
        format!("{}/settings/all", trim(&self.analytics_base_url))
    }

    pub fn time_series_url(&self) -> String {
        format!("{}/data/time-series", trim(&self.analytics_base_url))
    }
}

fn trim(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Extracts the value of cookie `key` from the `Set-Cookie` headers
pub(crate) fn extract_cookie(headers: &HeaderMap, key: &str) -> ExportResult<String> {
    let pattern = Regex::new(&format!(r"(?:^|[\s;,]){}=([^;]+)", regex::escape(key)))
        .map_err(|e| ExportError::Internal(format!("Invalid cookie pattern: {e}")))?;

    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            pattern
                .captures(value)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ExportError::Auth(format!("Could not get {key} cookie")))
}
