//! OAuth 2.0 Device Authorization Grant flow implementation.
//!
//! The flow requests a device code, shows the user code to the operator and
//! then polls the token endpoint until the user approves, the provider
//! reports an error, the code expires or the caller cancels.

use crate::api::ApiConfig;
use crate::auth::oauth::{AccessToken, DeviceAuthorization, GitHubOAuth, OAuthError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Added to the poll interval every time the provider answers `slow_down`
pub const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Outcome of a single token poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Authorized(AccessToken),
    /// `authorization_pending`: the user has not finished yet
    Pending,
    /// `slow_down`: back off before the next poll
    SlowDown,
    /// Any other provider error, or the poll request itself failed
    Failed {
        error: String,
        description: Option<String>,
    },
}

/// The two endpoints the device flow talks to.
#[async_trait]
pub trait DeviceFlowTransport: Send + Sync {
    async fn request_device_code(&self, scopes: &str) -> Result<DeviceAuthorization, OAuthError>;

    async fn poll_token(&self, device_code: &str) -> PollResult;
}

/// Event payload for login URL notification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUrlEvent {
    pub verification_url: String,
    pub user_code: String,
    pub expires_in: u64,
}

/// Progress notifications emitted while the flow runs.
#[derive(Debug, Clone)]
pub enum DeviceFlowEvent {
    /// Show these to the operator
    Prompt(LoginUrlEvent),
    BrowserOpened,
    /// Prompt and browser are done; polling starts
    Waiting,
    /// A poll came back `authorization_pending`
    Pending,
    /// A poll came back `slow_down`; the interval is now `interval`
    SlowDown { interval: Duration },
}

/// How a device flow ended. Exactly one of these per flow.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum DeviceFlowOutcome {
    Authorized(AccessToken),
    /// The device code request failed; polling never started
    RequestFailed(String),
    /// The provider rejected the authorization (denied, expired code, ...)
    Denied {
        error: String,
        description: Option<String>,
    },
    /// `expires_in` elapsed without a decision
    Expired,
    Cancelled,
}

impl DeviceFlowOutcome {
    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            DeviceFlowOutcome::Authorized(token) => Some(token),
            _ => None,
        }
    }

    pub fn into_token(self) -> Option<AccessToken> {
        match self {
            DeviceFlowOutcome::Authorized(token) => Some(token),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceFlowOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFlowOutcome::Authorized(_) => write!(f, "Authorization successful!"),
            DeviceFlowOutcome::RequestFailed(e) => write!(f, "Error starting device flow: {}", e),
            DeviceFlowOutcome::Denied { description, .. } => {
                write!(f, "Error: {}", description.as_deref().unwrap_or("Unknown error"))
            }
            DeviceFlowOutcome::Expired => write!(f, "Authorization timed out"),
            DeviceFlowOutcome::Cancelled => write!(f, "Authorization cancelled"),
        }
    }
}

/// A device authorization being polled.
///
/// The interval only ever grows, and only when the provider answers `slow_down`.
#[derive(Debug)]
pub struct DeviceSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    interval: Duration,
    expires_in: Duration,
    started_at: Instant,
}

impl DeviceSession {
    /// Start the clock on an authorization.
    pub fn begin(authorization: DeviceAuthorization) -> Self {
        Self {
            device_code: authorization.device_code,
            user_code: authorization.user_code,
            verification_uri: authorization.verification_uri,
            interval: Duration::from_secs(authorization.interval),
            expires_in: Duration::from_secs(authorization.expires_in),
            started_at: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.expires_in
    }

    fn slow_down(&mut self) {
        self.interval += SLOW_DOWN_STEP;
    }
}

/// Device flow authenticator.
pub struct DeviceFlow<T = GitHubOAuth> {
    transport: T,
    scopes: String,
    open_browser: bool,
}

impl DeviceFlow<GitHubOAuth> {
    /// Device flow against the configured GitHub host, using the configured scopes.
    pub fn from_config(config: &ApiConfig) -> Result<Self, OAuthError> {
        Ok(Self::new(GitHubOAuth::from_config(config)?).scopes(config.scopes.clone()))
    }
}

impl<T: DeviceFlowTransport> DeviceFlow<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            scopes: crate::api::config::DEFAULT_SCOPES.to_string(),
            open_browser: cfg!(feature = "browser"),
        }
    }

    pub fn scopes(mut self, scopes: impl Into<String>) -> Self {
        self.scopes = scopes.into();
        self
    }

    /// Try to open the verification URL in the default browser.
    ///
    /// Has no effect without the `browser` feature.
    pub fn open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    /// Request a device code. Nothing is shown to the user yet.
    pub async fn request_login(&self) -> Result<DeviceAuthorization, OAuthError> {
        let authorization = self.transport.request_device_code(&self.scopes).await?;
        tracing::info!(
            "Device code issued; user code {} at {}",
            authorization.user_code,
            authorization.verification_uri
        );
        Ok(authorization)
    }

    /// Poll until the user completes authorization, the provider reports an
    /// error, the code expires or `cancel` fires.
    ///
    /// The clock for `expires_in` starts when this is called.
    pub async fn poll_for_login<F>(
        &self,
        authorization: DeviceAuthorization,
        cancel: &CancellationToken,
        on_event: F,
    ) -> DeviceFlowOutcome
    where
        F: Fn(DeviceFlowEvent) + Send + Sync,
    {
        let mut session = DeviceSession::begin(authorization);
        let mut polls = 0u32;

        while !session.is_expired() {
            tokio::select! {
                _ = cancel.cancelled() => return DeviceFlowOutcome::Cancelled,
                _ = sleep(session.interval()) => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return DeviceFlowOutcome::Cancelled,
                result = self.transport.poll_token(&session.device_code) => result,
            };
            polls += 1;

            match result {
                PollResult::Authorized(token) => {
                    tracing::info!("Device authorized after {} polls", polls);
                    return DeviceFlowOutcome::Authorized(token);
                }
                PollResult::Pending => {
                    tracing::trace!("Authorization pending (poll {})", polls);
                    on_event(DeviceFlowEvent::Pending);
                }
                PollResult::SlowDown => {
                    session.slow_down();
                    tracing::debug!(
                        "Provider asked to slow down, polling every {}s",
                        session.interval().as_secs()
                    );
                    on_event(DeviceFlowEvent::SlowDown {
                        interval: session.interval(),
                    });
                }
                PollResult::Failed { error, description } => {
                    tracing::warn!(
                        "Device flow failed: {} ({})",
                        error,
                        description.as_deref().unwrap_or("no description")
                    );
                    return DeviceFlowOutcome::Denied { error, description };
                }
            }
        }

        tracing::warn!(
            "Device code expired after {}s and {} polls",
            session.elapsed().as_secs(),
            polls
        );
        DeviceFlowOutcome::Expired
    }

    /// Run the whole flow: request a code, prompt, optionally open the
    /// browser, then poll.
    pub async fn authenticate<F>(&self, cancel: &CancellationToken, on_event: F) -> DeviceFlowOutcome
    where
        F: Fn(DeviceFlowEvent) + Send + Sync,
    {
        if cancel.is_cancelled() {
            return DeviceFlowOutcome::Cancelled;
        }

        let requested = tokio::select! {
            _ = cancel.cancelled() => return DeviceFlowOutcome::Cancelled,
            requested = self.request_login() => requested,
        };

        let authorization = match requested {
            Ok(authorization) => authorization,
            Err(e) => {
                tracing::error!("Failed to request device code: {}", e);
                return DeviceFlowOutcome::RequestFailed(e.to_string());
            }
        };

        if cancel.is_cancelled() {
            return DeviceFlowOutcome::Cancelled;
        }

        on_event(DeviceFlowEvent::Prompt(LoginUrlEvent {
            verification_url: authorization.verification_uri.clone(),
            user_code: authorization.user_code.clone(),
            expires_in: authorization.expires_in,
        }));

        if self.open_browser && launch_browser(&authorization.verification_uri) {
            on_event(DeviceFlowEvent::BrowserOpened);
        }
        on_event(DeviceFlowEvent::Waiting);

        self.poll_for_login(authorization, cancel, on_event).await
    }
}

#[cfg(feature = "browser")]
fn launch_browser(url: &str) -> bool {
    match webbrowser::open(url) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Failed to open browser automatically: {}", e);
            false
        }
    }
}

#[cfg(not(feature = "browser"))]
fn launch_browser(_url: &str) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Transport replaying a fixed script of poll results.
    struct ScriptedTransport {
        authorization: Option<DeviceAuthorization>,
        script: Mutex<VecDeque<PollResult>>,
        fallback: PollResult,
        poll_times: Mutex<Vec<Instant>>,
        request_delay: Duration,
    }

    impl ScriptedTransport {
        fn new(interval: u64, expires_in: u64, script: Vec<PollResult>) -> Self {
            Self {
                authorization: Some(DeviceAuthorization {
                    device_code: "dc-1".to_string(),
                    user_code: "ABCD-1234".to_string(),
                    verification_uri: "https://github.com/login/device".to_string(),
                    interval,
                    expires_in,
                }),
                script: Mutex::new(script.into()),
                fallback: PollResult::Pending,
                poll_times: Mutex::new(Vec::new()),
                request_delay: Duration::ZERO,
            }
        }

        fn rejecting_device_code() -> Self {
            Self {
                authorization: None,
                ..Self::new(5, 900, Vec::new())
            }
        }

        fn polls(&self) -> usize {
            self.poll_times.lock().unwrap().len()
        }

        fn poll_offsets(&self, start: Instant) -> Vec<u64> {
            self.poll_times
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.duration_since(start).as_secs())
                .collect()
        }
    }

    #[async_trait]
    impl DeviceFlowTransport for ScriptedTransport {
        async fn request_device_code(&self, _scopes: &str) -> Result<DeviceAuthorization, OAuthError> {
            if !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }
            self.authorization.clone().ok_or_else(|| OAuthError::Provider {
                error: "unauthorized_client".to_string(),
                description: Some("bad client id".to_string()),
            })
        }

        async fn poll_token(&self, _device_code: &str) -> PollResult {
            self.poll_times.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn flow(transport: ScriptedTransport) -> DeviceFlow<ScriptedTransport> {
        DeviceFlow::new(transport).open_browser(false)
    }

    fn recorder() -> (Arc<Mutex<Vec<DeviceFlowEvent>>>, impl Fn(DeviceFlowEvent) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (events, move |e: DeviceFlowEvent| sink.lock().unwrap().push(e))
    }

    #[tokio::test(start_paused = true)]
    async fn slow_down_grows_interval_once_then_authorizes() {
        let flow = flow(ScriptedTransport::new(
            5,
            900,
            vec![
                PollResult::Pending,
                PollResult::Pending,
                PollResult::SlowDown,
                PollResult::Authorized(AccessToken::new("gho_final")),
            ],
        ));
        let (events, on_event) = recorder();
        let start = Instant::now();

        let outcome = flow.authenticate(&CancellationToken::new(), on_event).await;

        assert_eq!(outcome.token().map(AccessToken::secret), Some("gho_final"));
        assert_eq!(flow.transport.polls(), 4);

        // sleep precedes every poll; the gap after slow_down is 5s longer
        let offsets = flow.transport.poll_offsets(start);
        assert_eq!(offsets, vec![5, 10, 15, 25]);
        let gaps: Vec<u64> = offsets
            .iter()
            .scan(0, |prev, t| {
                let gap = t - *prev;
                *prev = *t;
                Some(gap)
            })
            .collect();
        assert!(gaps.windows(2).all(|w| w[0] <= w[1]));

        let events = events.lock().unwrap();
        assert!(matches!(events[0], DeviceFlowEvent::Prompt(ref p) if p.user_code == "ABCD-1234"));
        assert!(matches!(events[1], DeviceFlowEvent::Waiting));
        assert!(matches!(events[2], DeviceFlowEvent::Pending));
        let slow_downs: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DeviceFlowEvent::SlowDown { interval } => Some(*interval),
                _ => None,
            })
            .collect();
        assert_eq!(slow_downs, vec![Duration::from_secs(10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn always_pending_expires_without_token() {
        let flow = flow(ScriptedTransport::new(5, 12, Vec::new()));

        let outcome = flow.authenticate(&CancellationToken::new(), |_| {}).await;

        assert_eq!(outcome, DeviceFlowOutcome::Expired);
        assert_eq!(flow.transport.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn device_code_error_never_polls() {
        let flow = flow(ScriptedTransport::rejecting_device_code());
        let (events, on_event) = recorder();

        let outcome = flow.authenticate(&CancellationToken::new(), on_event).await;

        assert!(matches!(outcome, DeviceFlowOutcome::RequestFailed(ref e) if e.contains("unauthorized_client")));
        assert_eq!(flow.transport.polls(), 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_provider_error_is_terminal() {
        let flow = flow(ScriptedTransport::new(
            5,
            900,
            vec![
                PollResult::Pending,
                PollResult::Failed {
                    error: "access_denied".to_string(),
                    description: Some("The authorization request was denied.".to_string()),
                },
                PollResult::Authorized(AccessToken::new("never")),
            ],
        ));

        let outcome = flow.authenticate(&CancellationToken::new(), |_| {}).await;

        assert_eq!(
            outcome.to_string(),
            "Error: The authorization request was denied."
        );
        assert!(outcome.into_token().is_none());
        assert_eq!(flow.transport.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let flow = flow(ScriptedTransport::new(5, 900, Vec::new()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let outcome = flow.authenticate(&cancel, |_| {}).await;

        assert_eq!(outcome, DeviceFlowOutcome::Cancelled);
        assert_eq!(flow.transport.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_skips_prompt() {
        let flow = flow(ScriptedTransport::new(5, 900, Vec::new()));
        let (events, on_event) = recorder();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = flow.authenticate(&cancel, on_event).await;

        assert_eq!(outcome, DeviceFlowOutcome::Cancelled);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(flow.transport.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_device_code_request_skips_prompt() {
        let mut transport = ScriptedTransport::new(5, 900, Vec::new());
        transport.request_delay = Duration::from_secs(8);
        let flow = flow(transport);
        let (events, on_event) = recorder();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let outcome = flow.authenticate(&cancel, on_event).await;

        assert_eq!(outcome, DeviceFlowOutcome::Cancelled);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(flow.transport.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_interval_only_grows_on_slow_down() {
        let mut session = DeviceSession::begin(DeviceAuthorization {
            device_code: "dc".to_string(),
            user_code: "uc".to_string(),
            verification_uri: "https://example.com".to_string(),
            interval: 5,
            expires_in: 30,
        });

        assert_eq!(session.interval(), Duration::from_secs(5));
        session.slow_down();
        session.slow_down();
        assert_eq!(session.interval(), Duration::from_secs(15));

        assert!(!session.is_expired());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(session.is_expired());
    }
}
