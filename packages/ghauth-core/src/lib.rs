//! ghauth Core Library
//!
//! This crate provides the pieces behind the `ghauth` CLI:
//! - Configuration (environment, `config.env`, config file, defaults)
//! - Request headers for static tokens (`token` or `Bearer` style)
//! - OAuth device flow with `slow_down` backoff and cancellation
//! - REST calls: identity check, repository listing/creation, trending search
//!
//! # Features
//!
//! - `browser` (default): Automatically open browser during OAuth device flow
//!
//! # Example
//!
//! ```no_run
//! use ghauth_core::{api, auth};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = api::load_api_config();
//!
//!     // Authenticate using device flow
//!     let flow = auth::DeviceFlow::from_config(&config)?;
//!     let outcome = flow
//!         .authenticate(&CancellationToken::new(), |event| {
//!             if let auth::DeviceFlowEvent::Prompt(prompt) = event {
//!                 println!("Visit {} and enter {}", prompt.verification_url, prompt.user_code);
//!             }
//!         })
//!         .await;
//!
//!     // Use the token
//!     if let Some(token) = outcome.into_token() {
//!         let client = api::GitHubClient::new(
//!             &config,
//!             auth::Credentials::from_token(token.into_secret()),
//!         )?;
//!         println!("{}", client.verify_identity().await.to_json());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;

// Re-export commonly used types
pub use api::{ApiConfig, ApiError, GitHubClient, IdentityResult, NewRepository};
pub use auth::{AccessToken, AuthScheme, Credentials, DeviceFlow, DeviceFlowOutcome};
