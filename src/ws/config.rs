#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Backoff as _;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;
use secrecy::{ExposeSecret as _, SecretString};
use url::Url;

use crate::Result;
use crate::auth::TokenSource;
use crate::error::Error;

const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Query parameter carrying the resolved token.
const TOKEN_QUERY_PARAM: &str = "token";

/// Immutable configuration captured when a connection manager is created.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use notify_client_sdk::auth::TokenSource;
/// use notify_client_sdk::ws::config::{ConnectionOptions, ReconnectConfig};
///
/// let options = ConnectionOptions::builder()
///     .endpoint("wss://notify.example.com/ws")
///     .scope("org-42")
///     .token(TokenSource::fixed("secret"))
///     .reconnect(ReconnectConfig::builder().max_attempts(3).build())
///     .connect_timeout(Duration::from_secs(5))
///     .build();
/// # let _ = options;
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ConnectionOptions {
    /// Base WebSocket endpoint, must use the `ws` or `wss` scheme
    #[builder(into)]
    pub endpoint: String,
    /// Logical scope (e.g. an organization) appended as the last path segment
    #[builder(into)]
    pub scope: Option<String>,
    /// Token presented as a query parameter on every attempt
    #[builder(into)]
    pub token: Option<TokenSource>,
    /// Upper bound for token resolution plus transport open
    #[builder(default = DEFAULT_CONNECT_TIMEOUT_DURATION)]
    pub connect_timeout: Duration,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl ConnectionOptions {
    /// Parse and validate the configured endpoint.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::validation(format!(
                    "endpoint scheme must be ws or wss, got {other}"
                )));
            }
        }

        if url.cannot_be_a_base() {
            return Err(Error::validation("endpoint cannot be used as a base URL"));
        }

        Ok(url)
    }

    /// Build the URL for a single attempt from the validated endpoint and the resolved token.
    pub(crate) fn connection_url(&self, base: &Url, token: Option<&SecretString>) -> Result<Url> {
        let mut url = base.clone();

        if let Some(scope) = &self.scope {
            url.path_segments_mut()
                .map_err(|()| Error::validation("endpoint cannot be used as a base URL"))?
                .pop_if_empty()
                .push(scope);
        }

        if let Some(token) = token {
            url.query_pairs_mut()
                .append_pair(TOKEN_QUERY_PARAM, token.expose_secret());
        }

        Ok(url)
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up
    #[builder(default = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    pub max_attempts: u32,
    /// Backoff duration before the first reconnection attempt
    #[builder(default = DEFAULT_INITIAL_BACKOFF_DURATION)]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[builder(default = DEFAULT_MAX_BACKOFF_DURATION)]
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    #[builder(default = DEFAULT_BACKOFF_MULTIPLIER)]
    pub backoff_multiplier: f64,
    /// Settle into `Disconnected` as soon as the server rejects the handshake with 401/403
    /// instead of spending the remaining attempts
    #[builder(default)]
    pub stop_on_auth_failure: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_randomization_factor(0.0) // Delays must be reproducible per attempt
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}

/// Pure reconnection schedule.
///
/// The policy does not track attempts itself: callers pass the number of consecutive failures
/// so far and get back either the delay to wait before the next attempt or `None` to give up.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Delay before attempt number `attempt` (1-based), or `None` once `attempt` exceeds the
    /// configured maximum.
    ///
    /// Delays grow exponentially from `initial_backoff` and never exceed `max_backoff`.
    /// Attempt `0` means nothing has failed yet and maps to no delay.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.config.max_attempts {
            return None;
        }
        if attempt == 0 {
            return Some(Duration::ZERO);
        }

        let mut backoff: ExponentialBackoff = self.config.clone().into();
        let mut delay = Duration::ZERO;

        for _ in 0..attempt {
            let next = backoff.next_backoff()?.max(delay);
            // Stop once the schedule has flattened out.
            if next == delay || next >= self.config.max_backoff {
                return Some(next.min(self.config.max_backoff.max(delay)));
            }
            delay = next;
        }

        Some(delay)
    }
}

impl From<ReconnectConfig> for ReconnectPolicy {
    fn from(config: ReconnectConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectConfig::builder()
            .max_attempts(max_attempts)
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_secs(2))
            .backoff_multiplier(2.0)
            .build()
            .into()
    }

    #[test]
    fn backoff_sequence_doubles() {
        let policy = policy(10);

        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
    }

    #[test]
    fn backoff_is_non_decreasing() {
        let policy = policy(50);

        let delays: Vec<_> = (0..=50).map(|n| policy.next_delay(n).unwrap()).collect();
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1], "{:?} > {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn backoff_respects_max() {
        let policy = policy(20);

        for attempt in 1..=20 {
            let delay = policy.next_delay(attempt).unwrap();
            assert!(delay <= Duration::from_secs(2), "attempt {attempt}: {delay:?}");
        }
        assert_eq!(policy.next_delay(20), Some(Duration::from_secs(2)));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = policy(2);

        assert!(policy.next_delay(1).is_some());
        assert!(policy.next_delay(2).is_some());
        assert_eq!(policy.next_delay(3), None);
        assert_eq!(policy.next_delay(u32::MAX), None);
    }

    #[test]
    fn zero_attempts_means_no_delay() {
        assert_eq!(policy(3).next_delay(0), Some(Duration::ZERO));
    }

    #[test]
    fn flat_multiplier_keeps_initial_delay() {
        let policy: ReconnectPolicy = ReconnectConfig::builder()
            .initial_backoff(Duration::from_millis(250))
            .backoff_multiplier(1.0)
            .max_attempts(u32::MAX)
            .build()
            .into();

        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.next_delay(1_000_000), Some(Duration::from_millis(250)));
    }

    #[test]
    fn defaults_match_documentation() {
        let config = ReconnectConfig::default();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
        assert!(!config.stop_on_auth_failure);
    }

    #[test]
    fn connection_url_appends_scope_and_token() {
        let options = ConnectionOptions::builder()
            .endpoint("wss://notify.example.com/ws/")
            .scope("org-1")
            .build();
        let base = options.endpoint_url().unwrap();
        let token = SecretString::from("t0k3n");

        let url = options.connection_url(&base, Some(&token)).unwrap();
        assert_eq!(url.as_str(), "wss://notify.example.com/ws/org-1?token=t0k3n");
    }

    #[test]
    fn connection_url_without_scope_or_token_is_endpoint() {
        let options = ConnectionOptions::builder()
            .endpoint("ws://127.0.0.1:9000/ws")
            .build();
        let base = options.endpoint_url().unwrap();

        let url = options.connection_url(&base, None).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn endpoint_must_be_websocket() {
        let options = ConnectionOptions::builder()
            .endpoint("https://notify.example.com")
            .build();

        options.endpoint_url().unwrap_err();
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let options = ConnectionOptions::builder().endpoint("").build();

        options.endpoint_url().unwrap_err();
    }
}
