//! REST API access.
//!
//! Provides the configuration layer and the HTTP client for the GitHub REST API.

mod client;
pub mod config;
mod error;

pub use client::{
    GitHubClient, IdentityResult, NewRepository, REQUEST_TIMEOUT, TrendingRepository,
};
pub use config::{ApiConfig, ConfigSource, load_api_config};
pub use error::ApiError;
