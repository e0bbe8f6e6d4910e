//! Text and JSON rendering for command results.

use crate::OutputFormat;
use ghauth_core::api::{ApiConfig, IdentityResult, TrendingRepository};
use ghauth_core::auth::{DeviceFlowOutcome, LoginUrlEvent};
use serde_json::{Value, json};
use std::io::Write;

pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Plain status line; suppressed in JSON mode.
    pub fn line(&self, message: &str) {
        if let OutputFormat::Text = self.format {
            println!("{}", message);
        }
    }

    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Text => eprintln!("✗ {}", message),
            OutputFormat::Json => println!("{}", json!({ "error": message })),
        }
    }

    pub fn login_prompt(&self, prompt: &LoginUrlEvent) {
        match self.format {
            OutputFormat::Text => {
                println!();
                println!("{}", "=".repeat(50));
                println!("Please visit: {}", prompt.verification_url);
                println!("And enter code: {}", prompt.user_code);
                println!("{}", "=".repeat(50));
                println!();
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({
                        "status": "awaiting_authorization",
                        "verification_url": prompt.verification_url,
                        "user_code": prompt.user_code,
                        "expires_in": prompt.expires_in,
                    })
                );
            }
        }
    }

    /// Start of the polling line; progress dots follow on the same line.
    pub fn waiting(&self) {
        if let OutputFormat::Text = self.format {
            print!("Waiting for authorization...");
            let _ = std::io::stdout().flush();
        }
    }

    pub fn progress(&self) {
        if let OutputFormat::Text = self.format {
            print!(".");
            let _ = std::io::stdout().flush();
        }
    }

    pub fn login_outcome(&self, outcome: &DeviceFlowOutcome) {
        match self.format {
            OutputFormat::Text => match outcome {
                DeviceFlowOutcome::Authorized(_) => println!("\n✓ {}", outcome),
                DeviceFlowOutcome::RequestFailed(_) => eprintln!("✗ {}", outcome),
                _ => println!("\n✗ {}", outcome),
            },
            OutputFormat::Json => {
                let status = match outcome {
                    DeviceFlowOutcome::Authorized(_) => "authorized",
                    DeviceFlowOutcome::RequestFailed(_) => "request_failed",
                    DeviceFlowOutcome::Denied { .. } => "denied",
                    DeviceFlowOutcome::Expired => "expired",
                    DeviceFlowOutcome::Cancelled => "cancelled",
                };
                let mut body = json!({ "status": status });
                if !matches!(outcome, DeviceFlowOutcome::Authorized(_)) {
                    body["error"] = Value::String(outcome.to_string());
                }
                println!("{}", body);
            }
        }
    }

    /// Print an identity check; `token` is echoed only when asked for.
    pub fn identity(&self, identity: &IdentityResult, token: Option<&str>) {
        match self.format {
            OutputFormat::Text => {
                match identity {
                    IdentityResult::Authenticated { user } => {
                        println!(
                            "✓ Authenticated as {}",
                            user.get("login").and_then(Value::as_str).unwrap_or("-")
                        );
                        if let Some(name) = user.get("name").and_then(Value::as_str) {
                            println!("  Name: {}", name);
                        }
                        if let Some(url) = user.get("html_url").and_then(Value::as_str) {
                            println!("  Profile: {}", url);
                        }
                    }
                    IdentityResult::Unauthenticated { error } => {
                        println!("✗ Not authenticated: {}", error);
                    }
                }
                if let Some(token) = token {
                    println!();
                    println!("To reuse this token:");
                    println!("  export GITHUB_TOKEN={}", token);
                }
            }
            OutputFormat::Json => {
                let mut body = identity.to_json();
                if let Some(token) = token {
                    body["access_token"] = Value::String(token.to_string());
                }
                println!("{}", body);
            }
        }
    }

    pub fn repositories(&self, repos: &[Value]) {
        match self.format {
            OutputFormat::Text => {
                println!("{} repositories", repos.len());
                for repo in repos {
                    let name = repo
                        .get("full_name")
                        .and_then(Value::as_str)
                        .unwrap_or("-");
                    let visibility = if repo.get("private").and_then(Value::as_bool) == Some(true) {
                        "private"
                    } else {
                        "public"
                    };
                    println!("  {:40} {}", name, visibility);
                }
            }
            OutputFormat::Json => println!("{}", Value::Array(repos.to_vec())),
        }
    }

    pub fn created(&self, repo: &Value) {
        match self.format {
            OutputFormat::Text => {
                println!(
                    "✓ Created {}",
                    repo.get("full_name").and_then(Value::as_str).unwrap_or("-")
                );
                if let Some(url) = repo.get("html_url").and_then(Value::as_str) {
                    println!("  {}", url);
                }
            }
            OutputFormat::Json => println!("{}", repo),
        }
    }

    pub fn trending(&self, days: u32, repos: &[TrendingRepository]) {
        match self.format {
            OutputFormat::Text => {
                println!("\n🔥 Top trending repositories in the last {} days:\n", days);
                for repo in repos {
                    println!(
                        "{} - ⭐ {} - {}",
                        repo.full_name, repo.stargazers_count, repo.html_url
                    );
                }
            }
            OutputFormat::Json => println!("{}", json!(repos)),
        }
    }

    pub fn config(&self, config: &ApiConfig, config_path: &str, example: &str) {
        match self.format {
            OutputFormat::Text => {
                println!("Configuration");
                println!("=============");
                println!();
                println!("Config file:   {}", config_path);
                println!("API endpoint:  {} (from {})", config.api_url, config.source);
                println!("OAuth host:    {}", config.oauth_url);
                println!(
                    "Client ID:     {}",
                    config.client_id.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "Token:         {}",
                    if config.token.is_some() { "set" } else { "(not set)" }
                );
                println!("Auth scheme:   {:?}", config.auth_scheme);
                println!("Scopes:        {}", config.scopes);
                println!();
                println!("Environment variables:");
                println!("  GITHUB_TOKEN     - Personal access token");
                println!("  GITHUB_CLIENT_ID - OAuth App client ID for device flow");
                println!("  GITHUB_API_URL   - Override API endpoint");
                println!("  GITHUB_OAUTH_URL - Override OAuth host");
                println!();
                println!("Example config.toml:");
                println!();
                println!("{}", example);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({
                        "config_file": config_path,
                        "api_url": config.api_url,
                        "api_source": config.source.to_string(),
                        "oauth_url": config.oauth_url,
                        "client_id": config.client_id,
                        "token_set": config.token.is_some(),
                        "auth_scheme": config.auth_scheme,
                        "scopes": config.scopes,
                    })
                );
            }
        }
    }
}
