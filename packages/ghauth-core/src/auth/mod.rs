//! Authentication module.
//!
//! Provides the request header builder, static credentials and the OAuth 2.0
//! device flow.

mod credentials;
mod device_flow;
mod headers;
mod oauth;

pub use credentials::Credentials;
pub use device_flow::{
    DeviceFlow, DeviceFlowEvent, DeviceFlowOutcome, DeviceFlowTransport, DeviceSession,
    LoginUrlEvent, PollResult, SLOW_DOWN_STEP,
};
pub use headers::{AuthScheme, GITHUB_ACCEPT, GITHUB_USER_AGENT, build_headers};
pub use oauth::{AccessToken, DEVICE_CODE_GRANT, DeviceAuthorization, GitHubOAuth, OAuthError};
