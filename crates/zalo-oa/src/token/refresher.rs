//! OAuth v4 refresh-token grant.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::config::ZaloConfig;
use crate::error::{Result, ZaloError};
use crate::http_client::read_json;

/// Token endpoint path on the OAuth host.
pub const TOKEN_PATH: &str = "/v4/oa/access_token";

/// Result of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Zalo rotates refresh tokens; `None` keeps the current one.
    pub refresh_token: Option<String>,
    /// Lifetime reported by the server, if any.
    pub expires_in: Option<Duration>,
}

/// Exchanges a refresh token for a fresh access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    error_name: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_secs")]
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn error_message(&self) -> String {
        self.error_description
            .as_deref()
            .or(self.message.as_deref())
            .or(self.error_name.as_deref())
            .unwrap_or("Unknown error")
            .to_string()
    }
}

/// Zalo has returned `expires_in` both as a number and as a numeric string.
fn deserialize_lenient_secs<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// [`TokenRefresher`] backed by the Zalo OAuth endpoint.
pub struct HttpTokenRefresher {
    client: Client,
    url: String,
    app_id: String,
    secret_key: String,
}

impl HttpTokenRefresher {
    pub fn new(client: Client, config: &ZaloConfig) -> Self {
        Self {
            client,
            url: config.oauth_url(TOKEN_PATH),
            app_id: config.app_id.clone(),
            secret_key: config.secret_key.clone(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        if refresh_token.is_empty() {
            return Err(ZaloError::MissingRefreshToken);
        }

        let params = [
            ("app_id", self.app_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .client
            .post(&self.url)
            .header("secret_key", &self.secret_key)
            .form(&params)
            .send()
            .await?;

        let body: TokenResponse = read_json(response).await?;

        if body.error != 0 {
            return Err(ZaloError::Api {
                code: body.error,
                message: body.error_message(),
            });
        }

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ZaloError::Decode("No access_token in refresh response".to_string()))?;

        debug!(expires_in = ?body.expires_in, "Zalo OA token refresh successful");

        Ok(RefreshedToken {
            access_token,
            refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
            expires_in: body.expires_in.map(Duration::from_secs),
        })
    }
}
