use crate::error::SyncError;
use dotenvy::dotenv;
use realtime_link::{LinkConfig, DEFAULT_TYPING_TTL};
use resilience::BackoffPolicy;
use resource_cache::{ttl, CacheConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub ws_url: String,
    pub notifications_ttl: Duration,
    pub profile_ttl: Duration,
    /// `None` disables the fetch time limit
    pub fetch_timeout: Option<Duration>,
    pub token_timeout: Duration,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub typing_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".to_string(),
            notifications_ttl: ttl::NOTIFICATIONS,
            profile_ttl: ttl::PROFILE,
            fetch_timeout: Some(Duration::from_secs(30)),
            token_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
            backoff: BackoffPolicy::default(),
            typing_ttl: DEFAULT_TYPING_TTL,
        }
    }
}

impl SyncConfig {
    fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, SyncError> {
        match env::var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| SyncError::Config(format!("{name} has invalid value {raw:?}"))),
            Err(_) => Ok(default),
        }
    }

    fn millis_var(name: &str, default: Duration) -> Result<Duration, SyncError> {
        Self::parse_var(name, default.as_millis() as u64).map(Duration::from_millis)
    }

    pub fn from_env() -> Result<Self, SyncError> {
        dotenv().ok();
        let defaults = Self::default();

        let ws_url = env::var("SYNC_WS_URL").unwrap_or(defaults.ws_url);
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(SyncError::Config(format!(
                "SYNC_WS_URL must be a ws:// or wss:// url, got {ws_url:?}"
            )));
        }

        let fetch_timeout_ms = Self::parse_var(
            "SYNC_FETCH_TIMEOUT_MS",
            defaults.fetch_timeout.map(|d| d.as_millis() as u64).unwrap_or(0),
        )?;

        let max_attempts = Self::parse_var(
            "SYNC_RECONNECT_MAX_ATTEMPTS",
            defaults.backoff.max_attempts.unwrap_or(0),
        )?;

        let backoff_multiplier =
            Self::parse_var("SYNC_RECONNECT_MULTIPLIER", defaults.backoff.backoff_multiplier)?;
        if backoff_multiplier < 1.0 {
            return Err(SyncError::Config(
                "SYNC_RECONNECT_MULTIPLIER must be at least 1.0".to_string(),
            ));
        }

        let backoff = BackoffPolicy {
            initial_backoff: Self::millis_var(
                "SYNC_RECONNECT_INITIAL_MS",
                defaults.backoff.initial_backoff,
            )?,
            max_backoff: Self::millis_var("SYNC_RECONNECT_MAX_MS", defaults.backoff.max_backoff)?,
            backoff_multiplier,
            jitter: Self::parse_var("SYNC_RECONNECT_JITTER", defaults.backoff.jitter)?,
            // 0 = retry forever
            max_attempts: (max_attempts > 0).then_some(max_attempts),
        };

        Ok(Self {
            ws_url,
            notifications_ttl: Self::millis_var(
                "SYNC_NOTIFICATIONS_TTL_MS",
                defaults.notifications_ttl,
            )?,
            profile_ttl: Self::millis_var("SYNC_PROFILE_TTL_MS", defaults.profile_ttl)?,
            fetch_timeout: (fetch_timeout_ms > 0).then(|| Duration::from_millis(fetch_timeout_ms)),
            token_timeout: Self::millis_var("SYNC_TOKEN_TIMEOUT_MS", defaults.token_timeout)?,
            connect_timeout: Self::millis_var("SYNC_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
            backoff,
            typing_ttl: Self::millis_var("SYNC_TYPING_TTL_MS", defaults.typing_ttl)?,
        })
    }

    /// Deterministic settings for tests: no jitter, short timeouts
    pub fn test_defaults() -> Self {
        Self {
            ws_url: "ws://localhost:0/ws".to_string(),
            fetch_timeout: Some(Duration::from_secs(5)),
            token_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            backoff: BackoffPolicy {
                jitter: false,
                ..BackoffPolicy::default()
            },
            ..Self::default()
        }
    }

    pub fn cache_config(&self, default_ttl: Duration) -> CacheConfig {
        CacheConfig {
            default_ttl,
            fetch_timeout: self.fetch_timeout,
        }
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            endpoint: self.ws_url.clone(),
            token_timeout: self.token_timeout,
            connect_timeout: self.connect_timeout,
            backoff: self.backoff.clone(),
            typing_ttl: self.typing_ttl,
        }
    }
}
