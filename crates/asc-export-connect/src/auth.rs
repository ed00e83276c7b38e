//! Sign-in flow, including SMS two-step verification

use asc_export_api::{
    Authenticator,
    Credentials,
    ExportError,
    ExportResult,
    Session,
    TwoFactorPrompt,
};
use async_trait::async_trait;
use reqwest::{
    header::{
        HeaderMap,
        HeaderValue,
        COOKIE,
    },
    Response,
    StatusCode,
};
use secrecy::ExposeSecret;
use tracing::{
    info,
    warn,
};

use crate::{
    client::AppStoreConnectClient,
    config::{
        extract_cookie,
        ACCOUNT_COOKIE,
        SESSION_COOKIE,
    },
    types,
};

const WIDGET_KEY_HEADER: &str = "X-Apple-Widget-Key";
const SESSION_ID_HEADER: &str = "X-Apple-ID-Session-Id";
const SCNT_HEADER: &str = "scnt";

impl AppStoreConnectClient {
    fn login_headers(&self) -> ExportResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            WIDGET_KEY_HEADER,
            HeaderValue::from_str(&self.endpoints.widget_key)
                .map_err(|e| ExportError::Config(format!("Invalid widget key: {e}")))?,
        );
        Ok(headers)
    }

    async fn sign_in(
        &self, credentials: &Credentials, headers: &HeaderMap,
    ) -> ExportResult<Response> {
        let request = self
            .with_defaults(self.client.post(self.endpoints.signin_url()))
            .headers(headers.clone())
            .json(&types::SigninRequest {
                account_name: &credentials.username,
                password: credentials.password.expose_secret(),
                remember_me: false,
            });

        Self::send(request, "Could not log in").await
    }

    /// Requests an SMS code, asks the user for it and submits it. The
    /// returned response stands in for the initial sign-in response.
    async fn verify_two_factor(
        &self, conflict: &Response, headers: &mut HeaderMap, prompt: Option<&dyn TwoFactorPrompt>,
    ) -> ExportResult<Response> {
        info!("Attempting to handle 2-step verification");

        for name in [SESSION_ID_HEADER, SCNT_HEADER] {
            if let Some(value) = conflict.headers().get(name) {
                headers.insert(name, value.clone());
            }
        }

        let request = self
            .with_defaults(self.client.get(&self.endpoints.auth_base_url))
            .headers(headers.clone());
        let code_request = Self::send(request, "Error requesting 2SV code").await?;

        let status = code_request.status();
        if status == StatusCode::LOCKED {
            warn!("Too many codes requested, try again later or use last code");
        } else if !status.is_success() {
            return Err(ExportError::Auth(format!(
                "Error requesting 2SV code: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let prompt = prompt.ok_or_else(|| {
            ExportError::Auth("2-step verification required but no prompt is available".to_string())
        })?;
        let code = prompt.request_code().await?;
        let code = code.trim();
        if code.is_empty() {
            return Err(ExportError::Auth("No 2SV code given".to_string()));
        }

        let request = self
            .with_defaults(self.client.post(self.endpoints.verify_code_url()))
            .headers(headers.clone())
            .json(&types::SecurityCodeRequest {
                mode: "sms",
                phone_number: types::PhoneNumber { id: 1 },
                security_code: types::SecurityCode { code },
            });

        Self::send(request, "Could not verify 2SV code").await
    }

    async fn fetch_session_cookie(&self, account: &str) -> ExportResult<String> {
        let request = self
            .with_defaults(self.client.get(&self.endpoints.session_url))
            .header(COOKIE, format!("{ACCOUNT_COOKIE}={account}"));
        let response = Self::send(request, "Could not get session cookie").await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Auth(format!(
                "Could not get session cookie: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        extract_cookie(response.headers(), SESSION_COOKIE)
    }
}

#[async_trait]
impl Authenticator for AppStoreConnectClient {
    async fn login(
        &self, credentials: &Credentials, prompt: Option<&dyn TwoFactorPrompt>,
    ) -> ExportResult<Session> {
        let mut headers = self.login_headers()?;
        let mut response = self.sign_in(credentials, &headers).await?;

        if response.status() == StatusCode::CONFLICT {
            response = self
                .verify_two_factor(&response, &mut headers, prompt)
                .await?;
        }

        let status = response.status();
        if !status.is_success() {
            let message = if status == StatusCode::UNAUTHORIZED {
                "Invalid username and password"
            } else {
                "Unrecognized error"
            };
            return Err(ExportError::Auth(format!(
                "Could not log in: {} {} {message}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let account = extract_cookie(response.headers(), ACCOUNT_COOKIE)?;
        let session = self.fetch_session_cookie(&account).await?;

        info!("Logged in to App Store Connect");
        Ok(Session::new(account, session))
    }
}
