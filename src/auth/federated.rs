//! Google OAuth2 authorization-code flow.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, Instrument};
use url::Url;

use crate::APP_USER_AGENT;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const GOOGLE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/userinfo.email",
];

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(#[source] anyhow::Error),
    #[error("profile fetch failed: {0}")]
    ProfileFetchFailed(#[source] anyhow::Error),
}

/// Provider access token returned by the code exchange.
#[derive(Debug, Clone)]
pub struct ProviderToken(pub SecretString);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub external_id: String,
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL carrying client id, redirect, scopes and state.
    fn login_url(&self) -> String;

    fn check_state(&self, state: &str) -> bool;

    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, OAuthError>;

    async fn fetch_profile(&self, token: &ProviderToken) -> Result<Profile, OAuthError>;
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    client_id: String,
    client_secret: SecretString,
    redirect_url: Url,
    state: SecretString,
    auth_url: Url,
    token_url: Url,
    userinfo_url: Url,
    timeout: Duration,
}

impl GoogleConfig {
    /// # Errors
    /// Returns an error if a built-in endpoint fails to parse.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        redirect_url: Url,
        state: SecretString,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client_id: client_id.into(),
            client_secret,
            redirect_url,
            state,
            auth_url: Url::parse(GOOGLE_AUTH_URL)?,
            token_url: Url::parse(GOOGLE_TOKEN_URL)?,
            userinfo_url: Url::parse(GOOGLE_USERINFO_URL)?,
            timeout: Duration::from_secs(10),
        })
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_url(&self) -> &Url {
        &self.redirect_url
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

pub struct GoogleIdentity {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleIdentity {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GoogleConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    fn login_url(&self) -> String {
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_url.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &GOOGLE_SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("state", self.config.state.expose_secret());
        url.into()
    }

    fn check_state(&self, state: &str) -> bool {
        state
            .as_bytes()
            .ct_eq(self.config.state.expose_secret().as_bytes())
            .into()
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, OAuthError> {
        let span = tracing::info_span!(
            "oauth.exchange_code",
            http.method = "POST",
            url = %self.config.token_url
        );
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .instrument(span)
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| OAuthError::ExchangeFailed(e.into()))?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(e.into()))?;

        debug!("authorization code exchanged");

        Ok(ProviderToken(SecretString::from(token.access_token)))
    }

    async fn fetch_profile(&self, token: &ProviderToken) -> Result<Profile, OAuthError> {
        let span = tracing::info_span!(
            "oauth.fetch_profile",
            http.method = "GET",
            url = %self.config.userinfo_url
        );
        let info: UserInfo = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(token.0.expose_secret())
            .send()
            .instrument(span)
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| OAuthError::ProfileFetchFailed(e.into()))?
            .json()
            .await
            .map_err(|e| OAuthError::ProfileFetchFailed(e.into()))?;

        profile_from(info)
    }
}

fn profile_from(info: UserInfo) -> Result<Profile, OAuthError> {
    let email = info.email.unwrap_or_default().trim().to_string();
    if email.is_empty() || info.id.is_empty() {
        return Err(OAuthError::ProfileFetchFailed(anyhow::anyhow!(
            "profile is missing id or email"
        )));
    }

    // Display name is optional at Google; fall back to the mailbox name.
    let name = match info.name.map(|n| n.trim().to_string()) {
        Some(name) if !name.is_empty() => name,
        _ => email.split('@').next().unwrap_or_default().to_string(),
    };

    Ok(Profile {
        external_id: info.id,
        name,
        email,
    })
}
