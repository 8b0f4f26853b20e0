//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ZaloError};

/// Default OAuth host (token refresh).
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://oauth.zaloapp.com";

/// Default OpenAPI host (message delivery).
pub const DEFAULT_OPENAPI_BASE_URL: &str = "https://openapi.zalo.me";

/// Refresh this long before the access token expires.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Lifetime assumed when Zalo does not report `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout applied to every outbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between two consecutive sends of a batch.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(200);

/// Zalo OA client configuration.
///
/// Everything the token manager and the sender need is injected here; the
/// crate reads no environment variables itself.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZaloConfig {
    /// Zalo application id (`app_id` on the token endpoint).
    pub app_id: String,
    /// Application secret (`secret_key` header on the token endpoint).
    pub secret_key: String,
    /// Seed access token. May be empty, in which case the first request refreshes.
    pub access_token: String,
    /// Seed refresh token.
    pub refresh_token: String,
    /// Remaining lifetime assumed for the seed access token.
    #[serde(with = "duration_secs")]
    pub initial_token_lifetime: Duration,
    /// Refresh once the remaining lifetime drops to this margin.
    #[serde(with = "duration_secs")]
    pub refresh_margin: Duration,
    /// Lifetime used when the refresh response omits `expires_in`.
    #[serde(with = "duration_secs")]
    pub default_token_lifetime: Duration,
    pub oauth_base_url: String,
    pub openapi_base_url: String,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub batch_delay: Duration,
}

impl Default for ZaloConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            secret_key: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            initial_token_lifetime: DEFAULT_TOKEN_LIFETIME,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            default_token_lifetime: DEFAULT_TOKEN_LIFETIME,
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            openapi_base_url: DEFAULT_OPENAPI_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for ZaloConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZaloConfig")
            .field("app_id", &self.app_id)
            .field("secret_key", &redact(&self.secret_key))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("initial_token_lifetime", &self.initial_token_lifetime)
            .field("refresh_margin", &self.refresh_margin)
            .field("default_token_lifetime", &self.default_token_lifetime)
            .field("oauth_base_url", &self.oauth_base_url)
            .field("openapi_base_url", &self.openapi_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("batch_delay", &self.batch_delay)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "<redacted>" }
}

impl ZaloConfig {
    /// Check the configuration before building a client.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.oauth_base_url).map_err(|e| {
            ZaloError::InvalidConfig(format!("oauth_base_url '{}': {}", self.oauth_base_url, e))
        })?;
        Url::parse(&self.openapi_base_url).map_err(|e| {
            ZaloError::InvalidConfig(format!(
                "openapi_base_url '{}': {}",
                self.openapi_base_url, e
            ))
        })?;

        if !self.refresh_token.is_empty() && self.app_id.trim().is_empty() {
            return Err(ZaloError::InvalidConfig(
                "app_id is required when a refresh token is configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the seed allows renewing the access token at all.
    #[inline]
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Join `path` onto the OAuth host.
    pub fn oauth_url(&self, path: &str) -> String {
        join_url(&self.oauth_base_url, path)
    }

    /// Join `path` onto the OpenAPI host.
    pub fn openapi_url(&self, path: &str) -> String {
        join_url(&self.openapi_base_url, path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ZaloConfig::default();
        assert_eq!(config.refresh_margin, Duration::from_secs(300));
        assert_eq!(config.default_token_lifetime, Duration::from_secs(86_400));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(!config.can_refresh());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = ZaloConfig {
            openapi_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ZaloError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_requires_app_id_for_refresh() {
        let config = ZaloConfig {
            refresh_token: "rt".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ZaloConfig {
            app_id: "123".to_string(),
            refresh_token: "rt".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_join() {
        let config = ZaloConfig {
            openapi_base_url: "http://127.0.0.1:9000/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.openapi_url("/v3.0/oa/message/cs"),
            "http://127.0.0.1:9000/v3.0/oa/message/cs"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ZaloConfig {
            secret_key: "top-secret".to_string(),
            refresh_token: "rt-value".to_string(),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("top-secret"));
        assert!(!debug.contains("rt-value"));
        assert!(debug.contains("<redacted>"));
    }
}
