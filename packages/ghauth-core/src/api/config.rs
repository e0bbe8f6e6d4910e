use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::AuthScheme;

/// Default REST API URL
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default OAuth host (device code and token endpoints live here)
pub const DEFAULT_OAUTH_URL: &str = "https://github.com";

/// Scopes requested by the device flow when nothing else is configured
pub const DEFAULT_SCOPES: &str = "repo user";

/// Dotenv file picked up from the working directory
const DOTENV_FILE: &str = "config.env";

const ENV_TOKEN: &str = "GITHUB_TOKEN";
const ENV_CLIENT_ID: &str = "GITHUB_CLIENT_ID";
const ENV_API_URL: &str = "GITHUB_API_URL";
const ENV_OAUTH_URL: &str = "GITHUB_OAUTH_URL";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    github: Option<GitHubSection>,
}

#[derive(Debug, Deserialize, Default)]
struct GitHubSection {
    /// REST API base URL (e.g., "https://github.example.com/api/v3")
    api_url: Option<String>,
    /// OAuth host for device flow (e.g., "https://github.example.com")
    oauth_url: Option<String>,
    /// OAuth App client ID
    client_id: Option<String>,
    /// Personal access token
    token: Option<String>,
    /// "token" or "bearer"
    auth_scheme: Option<AuthScheme>,
    /// Space separated device flow scopes
    scopes: Option<String>,
}

/// Runtime API configuration, passed explicitly to every client.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL for REST calls
    pub api_url: String,
    /// Base URL for the OAuth device flow endpoints
    pub oauth_url: String,
    /// OAuth App client ID, required only for the device flow
    pub client_id: Option<String>,
    /// Static token (PAT or a previously obtained OAuth token)
    pub token: Option<String>,
    pub auth_scheme: AuthScheme,
    pub scopes: String,
    /// Source of the API URL (for display)
    pub source: ConfigSource,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_url", &self.api_url)
            .field("oauth_url", &self.oauth_url)
            .field("client_id", &self.client_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auth_scheme", &self.auth_scheme)
            .field("scopes", &self.scopes)
            .field("source", &self.source)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            client_id: None,
            token: None,
            auth_scheme: AuthScheme::default(),
            scopes: DEFAULT_SCOPES.to_string(),
            source: ConfigSource::Default,
        }
    }
}

impl ApiConfig {
    /// Config pointing both the API and the OAuth host at one base URL.
    ///
    /// Mostly useful against a mock server.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = normalize_url(base_url).unwrap_or_default();
        Self {
            api_url: base.clone(),
            oauth_url: base,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("ghauth").join("config.toml"))
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Load configuration from the config file, if there is one
fn load_config_file(path: Option<&Path>) -> Option<ConfigFile> {
    let path = path?;
    if !path.exists() {
        return None;
    }

    match read_config_file(path) {
        Ok(config) => {
            tracing::debug!("Loaded config from {:?}", path);
            Some(config)
        }
        Err(e) => {
            tracing::warn!("{:#}", e);
            None
        }
    }
}

fn normalize_url(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    (!url.is_empty()).then(|| url.to_string())
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Load API configuration with priority:
/// 1. Environment variables (after reading `config.env` if present)
/// 2. Config file (~/.config/ghauth/config.toml)
/// 3. Default values
pub fn load_api_config() -> ApiConfig {
    match dotenvy::from_filename(DOTENV_FILE) {
        Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Failed to load {}: {}", DOTENV_FILE, e),
    }

    let config_path = get_config_file_path();
    resolve_config(
        |key| std::env::var(key).ok(),
        load_config_file(config_path.as_deref()),
    )
}

/// Merge environment lookups over an optional config file over defaults.
fn resolve_config<F>(env: F, file: Option<ConfigFile>) -> ApiConfig
where
    F: Fn(&str) -> Option<String>,
{
    let section = file.and_then(|f| f.github).unwrap_or_default();
    let mut config = ApiConfig::default();

    if let Some(url) = env(ENV_API_URL).as_deref().and_then(normalize_url) {
        tracing::info!("Using API URL from environment variable: {}", url);
        config.api_url = url;
        config.source = ConfigSource::Environment;
    } else if let Some(url) = section.api_url.as_deref().and_then(normalize_url) {
        tracing::info!("Using API URL from config file: {}", url);
        config.api_url = url;
        config.source = ConfigSource::ConfigFile;
    } else {
        tracing::debug!("Using default API URL: {}", DEFAULT_API_URL);
    }

    if let Some(url) = env(ENV_OAUTH_URL)
        .as_deref()
        .and_then(normalize_url)
        .or_else(|| section.oauth_url.as_deref().and_then(normalize_url))
    {
        config.oauth_url = url;
    }

    config.token = env(ENV_TOKEN)
        .and_then(non_empty)
        .or_else(|| section.token.and_then(non_empty));
    config.client_id = env(ENV_CLIENT_ID)
        .and_then(non_empty)
        .or_else(|| section.client_id.and_then(non_empty));

    if let Some(scheme) = section.auth_scheme {
        config.auth_scheme = scheme;
    }
    if let Some(scopes) = section.scopes.and_then(non_empty) {
        config.scopes = scopes;
    }

    config
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/ghauth/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# ghauth configuration
# Place this file at: ~/.config/ghauth/config.toml

[github]
# OAuth App client ID used by `ghauth login`
# client_id = "Iv1.0123456789abcdef"

# Personal access token used when no device flow login is performed
# token = "ghp_..."

# Authorization header style: "token" (default) or "bearer"
# auth_scheme = "token"

# Scopes requested by the device flow
# scopes = "repo user"

# GitHub Enterprise endpoints
# api_url = "https://github.example.com/api/v3"
# oauth_url = "https://github.example.com"
"#
    .to_string()
}
