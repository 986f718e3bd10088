//! Runtime configuration for the sync engine and the remote API.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_API_URL: &str = "HABITSYNC_API_URL";
pub const ENV_API_TOKEN: &str = "HABITSYNC_API_TOKEN";

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_UNIT_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Tuning knobs for [`crate::sync::SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEngineConfig {
    /// Period of the automatic sync trigger once the engine is started.
    pub sync_interval: Duration,
    /// A transiently failing operation becomes terminal after this many attempts.
    pub max_retries: u32,
    /// Base of the exponential backoff: `retry_unit * 2^retry_count`.
    pub retry_unit: Duration,
    /// Timeout applied to every remote call by the HTTP gateway.
    pub request_timeout: Duration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_unit: Duration::from_millis(DEFAULT_RETRY_UNIT_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SyncEngineConfig {
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_retry_unit(mut self, unit: Duration) -> Self {
        self.retry_unit = unit;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Backoff before the next attempt of an item that has failed
    /// `retry_count` times.
    #[must_use]
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count);
        self.retry_unit.saturating_mul(factor)
    }
}

/// Location and credentials of the remote HTTP API.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL without a trailing slash, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RemoteConfig {
    /// Build a config for `base_url`, normalizing the trailing slash.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            auth_token: None,
        })
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = normalize_text_option(Some(token.into()));
        self
    }

    /// Load the remote configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no variables are set.
    /// Returns an error when only a token is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<RemoteConfig>> {
    let base_url = normalize_text_option(lookup(ENV_API_URL));
    let auth_token = normalize_text_option(lookup(ENV_API_TOKEN));

    match (base_url, auth_token) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(Error::Config(format!(
            "Remote configuration is incomplete. Missing: {ENV_API_URL}"
        ))),
        (Some(base_url), auth_token) => Ok(Some(RemoteConfig {
            base_url: normalize_base_url(base_url)?,
            auth_token,
        })),
    }
}

fn normalize_base_url(value: String) -> Result<String> {
    let value = value.trim().trim_end_matches('/').to_string();
    if !is_http_url(&value) {
        return Err(Error::Config(format!(
            "{ENV_API_URL} must start with http:// or https:// (got {value:?})"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<Option<RemoteConfig>> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn parse_config_none_returns_none() {
        let map = HashMap::new();
        assert!(parse_from_map(&map).unwrap().is_none());
    }

    #[test]
    fn parse_config_rejects_token_without_url() {
        let mut map = HashMap::new();
        map.insert(ENV_API_TOKEN, "secret");

        match parse_from_map(&map).unwrap_err() {
            Error::Config(message) => assert!(message.contains(ENV_API_URL)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_config_normalizes_url_and_keeps_token() {
        let mut map = HashMap::new();
        map.insert(ENV_API_URL, " https://api.example.com/ ");
        map.insert(ENV_API_TOKEN, "secret-token");

        let config = parse_from_map(&map).unwrap().unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.auth_token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn parse_config_rejects_non_http_url() {
        let mut map = HashMap::new();
        map.insert(ENV_API_URL, "api.example.com");
        assert!(matches!(parse_from_map(&map), Err(Error::Config(_))));
    }

    #[test]
    fn debug_redacts_token() {
        let config = RemoteConfig::new("https://api.example.com")
            .unwrap()
            .with_auth_token("super-secret");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn retry_delay_doubles_per_attempt() {
        let config = SyncEngineConfig::default().with_retry_unit(Duration::from_millis(250));
        assert_eq!(config.retry_delay(0), Duration::from_millis(250));
        assert_eq!(config.retry_delay(1), Duration::from_millis(500));
        assert_eq!(config.retry_delay(3), Duration::from_secs(2));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncEngineConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_unit, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
