//! Credentials used by the resource client.
//!
//! A credential is read once when the client is built and never written
//! anywhere by this crate.

use crate::api::ApiConfig;
use crate::auth::AuthScheme;

#[derive(Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    pub scheme: AuthScheme,
}

impl Credentials {
    /// No credential; requests go out unauthenticated.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            scheme: AuthScheme::default(),
        }
    }

    /// Take the token and scheme resolved from env/config file.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            token: config.token.clone(),
            scheme: config.auth_scheme,
        }
    }

    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn is_present(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("scheme", &self.scheme)
            .finish()
    }
}
