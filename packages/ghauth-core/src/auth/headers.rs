//! Request headers shared by every REST call.

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

/// Media type for the v3 REST API
pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// User-Agent sent with every request (GitHub rejects requests without one)
pub const GITHUB_USER_AGENT: &str = concat!("ghauth/", env!("CARGO_PKG_VERSION"));

/// How the credential is rendered into the Authorization header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: token <credential>`
    #[default]
    Token,
    /// `Authorization: Bearer <credential>`
    Bearer,
}

impl AuthScheme {
    fn render(self, credential: &str) -> String {
        match self {
            AuthScheme::Token => format!("token {}", credential),
            AuthScheme::Bearer => format!("Bearer {}", credential),
        }
    }
}

/// Build the header set for an API call.
///
/// Authorization is included only when a non-empty credential is given.
pub fn build_headers(token: Option<&str>, scheme: AuthScheme) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
    headers.insert(USER_AGENT, HeaderValue::from_static(GITHUB_USER_AGENT));

    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return headers;
    };

    match HeaderValue::from_str(&scheme.render(token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Err(e) => {
            tracing::warn!("Token is not a valid header value, sending unauthenticated: {}", e);
        }
    }

    headers
}
