//! Session and coordinator configuration.
//!
//! Library callers build a [`ClientConfig`] programmatically and hand it to
//! [`crate::session::ConsultationSessionClient::initialize`]. The
//! `from_env` constructors exist for the `carelink-probe` binary and follow
//! 12-factor style (environment variables, optionally from a `.env` file via
//! `dotenvy`).

use std::time::Duration;

use crate::error::ClientError;

/// Default number of consecutive reconnection attempts.
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;
/// Default initial reconnection delay.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);
/// Default upper bound for the reconnection backoff.
pub const DEFAULT_RECONNECTION_DELAY_MAX: Duration = Duration::from_millis(5000);
/// Default acknowledgment timeout.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(15);
/// Default pause between two queued operations.
pub const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_millis(200);

/// Connection settings for one consultation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,

    /// Consecutive failed attempts tolerated before giving up.
    pub reconnection_attempts: u32,

    /// Delay before the first reconnection attempt; doubles per attempt.
    pub reconnection_delay: Duration,

    /// Cap for the doubled reconnection delay.
    pub reconnection_delay_max: Duration,

    /// Open the connection as part of `initialize`.
    pub auto_connect: bool,

    /// How long a request/response call waits for its acknowledgment.
    /// `None` waits until the connection drops.
    pub ack_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a configuration for `url` with default reconnection settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            reconnection_delay_max: DEFAULT_RECONNECTION_DELAY_MAX,
            auto_connect: true,
            ack_timeout: Some(DEFAULT_ACK_TIMEOUT),
        }
    }

    /// Sets the number of reconnection attempts.
    #[must_use]
    pub const fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    /// Sets the initial reconnection delay.
    #[must_use]
    pub const fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    /// Sets the reconnection delay cap.
    #[must_use]
    pub const fn with_reconnection_delay_max(mut self, delay: Duration) -> Self {
        self.reconnection_delay_max = delay;
        self
    }

    /// Enables or disables connecting during `initialize`.
    #[must_use]
    pub const fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Sets the acknowledgment timeout.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Returns the backoff delay before reconnection attempt `attempt`
    /// (1-based): the initial delay doubled per attempt, capped.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnection_delay
            .saturating_mul(factor)
            .min(self.reconnection_delay_max.max(self.reconnection_delay))
    }

    /// Checks that the URL is a WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the URL is empty or does not
    /// use the `ws` or `wss` scheme.
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ClientError::InvalidConfig("url is empty".to_string()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ClientError::InvalidConfig(format!(
                "url must use ws:// or wss://, got {url}"
            )));
        }
        Ok(())
    }

    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Unset or unparsable numeric variables fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if `CARELINK_WS_URL` is not
    /// set.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();

        let url = std::env::var("CARELINK_WS_URL")
            .map_err(|_| ClientError::InvalidConfig("CARELINK_WS_URL is not set".to_string()))?;

        let reconnection_attempts =
            parse_env("CARELINK_RECONNECT_ATTEMPTS", DEFAULT_RECONNECTION_ATTEMPTS);
        let reconnection_delay = parse_env_millis("CARELINK_RECONNECT_DELAY_MS")
            .unwrap_or(DEFAULT_RECONNECTION_DELAY);
        let reconnection_delay_max = parse_env_millis("CARELINK_RECONNECT_DELAY_MAX_MS")
            .unwrap_or(DEFAULT_RECONNECTION_DELAY_MAX);

        // 0 disables the timeout.
        let ack_timeout = match parse_env_millis("CARELINK_ACK_TIMEOUT_MS") {
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
            None => Some(DEFAULT_ACK_TIMEOUT),
        };

        Ok(Self {
            url,
            reconnection_attempts,
            reconnection_delay,
            reconnection_delay_max,
            auto_connect: true,
            ack_timeout,
        })
    }
}

/// Settings for a [`crate::coordinator::RequestCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Pause inserted after each settled operation before the next starts.
    pub inter_request_delay: Duration,
}

impl CoordinatorConfig {
    /// Loads `CARELINK_REQUEST_DELAY_MS`, falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            inter_request_delay: parse_env_millis("CARELINK_REQUEST_DELAY_MS")
                .unwrap_or(DEFAULT_INTER_REQUEST_DELAY),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding a millisecond count.
fn parse_env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let config = ClientConfig::new("ws://localhost:3000/ws");
        assert_eq!(config.reconnection_attempts, 5);
        assert_eq!(config.reconnection_delay, Duration::from_millis(1000));
        assert!(config.auto_connect);
        assert_eq!(config.ack_timeout, Some(DEFAULT_ACK_TIMEOUT));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ClientConfig::new("ws://x")
            .with_reconnection_delay(Duration::from_millis(100))
            .with_reconnection_delay_max(Duration::from_millis(350));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(350));
        assert_eq!(config.backoff_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn backoff_never_below_initial_delay() {
        let config = ClientConfig::new("ws://x")
            .with_reconnection_delay(Duration::from_millis(800))
            .with_reconnection_delay_max(Duration::from_millis(10));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(800));
    }

    #[test]
    fn validate_rejects_non_websocket_urls() {
        assert!(ClientConfig::new("ws://localhost/ws").validate().is_ok());
        assert!(ClientConfig::new("wss://chat.example.org").validate().is_ok());
        assert!(matches!(
            ClientConfig::new("").validate(),
            Err(ClientError::InvalidConfig(_))
        ));
        assert!(matches!(
            ClientConfig::new("https://chat.example.org").validate(),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn coordinator_default_delay_is_200ms() {
        assert_eq!(
            CoordinatorConfig::default().inter_request_delay,
            Duration::from_millis(200)
        );
    }
}
