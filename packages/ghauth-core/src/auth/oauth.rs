//! HTTP side of the device flow: the device-code and token endpoints.

use crate::api::{ApiConfig, REQUEST_TIMEOUT};
use crate::auth::device_flow::{DeviceFlowTransport, PollResult};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue, USER_AGENT};
use serde::Deserialize;

use super::headers::GITHUB_USER_AGENT;

/// Grant type for polling the token endpoint
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_EXPIRES_IN_SECS: u64 = 900;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("no OAuth client id configured (set GITHUB_CLIENT_ID or github.client_id)")]
    MissingClientId,

    /// The provider answered with an `error` field
    #[error("{error}{}", describe(.description))]
    Provider {
        error: String,
        description: Option<String>,
    },

    #[error("HTTP Error: {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

/// What the device-code endpoint hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds between polls
    pub interval: u64,
    /// Seconds until the device code expires
    pub expires_in: u64,
}

/// Access token obtained from the device flow.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    secret: String,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            token_type: None,
            scope: None,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn into_secret(self) -> String {
        self.secret
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeBody {
    device_code: Option<String>,
    user_code: Option<String>,
    verification_uri: Option<String>,
    expires_in: Option<u64>,
    interval: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl DeviceCodeBody {
    fn into_authorization(self) -> Result<DeviceAuthorization, OAuthError> {
        if let Some(error) = self.error {
            return Err(OAuthError::Provider {
                error,
                description: self.error_description,
            });
        }

        let missing = |field: &str| OAuthError::Decode(format!("missing field `{}`", field));

        Ok(DeviceAuthorization {
            device_code: self.device_code.ok_or_else(|| missing("device_code"))?,
            user_code: self.user_code.ok_or_else(|| missing("user_code"))?,
            verification_uri: self
                .verification_uri
                .ok_or_else(|| missing("verification_uri"))?,
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL_SECS),
            expires_in: self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        })
    }
}

impl TokenBody {
    fn classify(self) -> PollResult {
        if let Some(secret) = self.access_token.filter(|t| !t.is_empty()) {
            return PollResult::Authorized(AccessToken {
                secret,
                token_type: self.token_type,
                scope: self.scope,
            });
        }

        match self.error.as_deref() {
            Some("authorization_pending") => PollResult::Pending,
            Some("slow_down") => PollResult::SlowDown,
            Some(other) => PollResult::Failed {
                error: other.to_string(),
                description: self.error_description,
            },
            None => PollResult::Failed {
                error: "invalid_response".to_string(),
                description: Some("response carried neither a token nor an error".to_string()),
            },
        }
    }
}

/// Device flow endpoints of a GitHub (or GitHub Enterprise) host.
#[derive(Debug, Clone)]
pub struct GitHubOAuth {
    base_url: String,
    client_id: String,
    http: reqwest::Client,
}

impl GitHubOAuth {
    pub fn new(base_url: &str, client_id: impl Into<String>) -> Result<Self, OAuthError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(GITHUB_USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            http,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, OAuthError> {
        let client_id = config
            .client_id
            .as_deref()
            .ok_or(OAuthError::MissingClientId)?;
        Self::new(&config.oauth_url, client_id)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn post_token_request(&self, device_code: &str) -> Result<PollResult, OAuthError> {
        let url = format!("{}/login/oauth/access_token", self.base_url);

        let resp = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
                ("grant_type", DEVICE_CODE_GRANT),
            ])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        match serde_json::from_str::<TokenBody>(&text) {
            Ok(body) => Ok(body.classify()),
            Err(_) if !status.is_success() => Err(OAuthError::Status(status.as_u16())),
            Err(e) => Err(OAuthError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl DeviceFlowTransport for GitHubOAuth {
    async fn request_device_code(&self, scopes: &str) -> Result<DeviceAuthorization, OAuthError> {
        let url = format!("{}/login/device/code", self.base_url);
        tracing::debug!("Requesting device code from {}", url);

        let resp = self
            .http
            .post(&url)
            .form(&[("client_id", self.client_id.as_str()), ("scope", scopes)])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        match serde_json::from_str::<DeviceCodeBody>(&text) {
            Ok(body) if body.error.is_some() || status.is_success() => body.into_authorization(),
            Ok(_) => Err(OAuthError::Status(status.as_u16())),
            Err(_) if !status.is_success() => Err(OAuthError::Status(status.as_u16())),
            Err(e) => Err(OAuthError::Decode(e.to_string())),
        }
    }

    async fn poll_token(&self, device_code: &str) -> PollResult {
        match self.post_token_request(device_code).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!("Token poll failed: {}", e);
                PollResult::Failed {
                    error: "request_failed".to_string(),
                    description: Some(e.to_string()),
                }
            }
        }
    }
}
