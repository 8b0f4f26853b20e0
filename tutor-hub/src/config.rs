//! Environment-driven application configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use zalo_oa::ZaloConfig;

use crate::api::server::ApiServerConfig;
use crate::error::{Error, Result};

/// Everything the binary needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    /// Directory for rotated log files. Console only when unset.
    pub log_dir: Option<PathBuf>,
    pub zalo: ZaloConfig,
    /// Pre-uploaded attachment used for paid fallback notifications.
    pub promotion_attachment_id: Option<String>,
}

impl AppConfig {
    /// Load from the process environment after reading `.env`, if present.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `LOG_DIR`
    /// - `ZALO_APP_ID`, `ZALO_SECRET_KEY`, `ZALO_ACCESS_TOKEN`, `ZALO_REFRESH_TOKEN`
    /// - `ZALO_TOKEN_LIFETIME_SECS`, `ZALO_REFRESH_MARGIN_SECS`
    /// - `ZALO_REQUEST_TIMEOUT_SECS`, `ZALO_BATCH_DELAY_MS`
    /// - `ZALO_OAUTH_BASE_URL`, `ZALO_OPENAPI_BASE_URL`
    /// - `ZALO_PROMOTION_ATTACHMENT_ID`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` as the variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut server = ApiServerConfig::default();
        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            server.bind_address = bind_address;
        }
        if let Some(port) = parse::<u16>("API_PORT", get("API_PORT"))? {
            server.port = port;
        }

        let mut zalo = ZaloConfig::default();
        if let Some(app_id) = get("ZALO_APP_ID") {
            zalo.app_id = app_id;
        }
        if let Some(secret_key) = get("ZALO_SECRET_KEY") {
            zalo.secret_key = secret_key;
        }
        if let Some(access_token) = get("ZALO_ACCESS_TOKEN") {
            zalo.access_token = access_token;
        }
        if let Some(refresh_token) = get("ZALO_REFRESH_TOKEN") {
            zalo.refresh_token = refresh_token;
        }
        if let Some(secs) =
            parse::<u64>("ZALO_TOKEN_LIFETIME_SECS", get("ZALO_TOKEN_LIFETIME_SECS"))?
        {
            zalo.initial_token_lifetime = Duration::from_secs(secs);
        }
        if let Some(secs) =
            parse::<u64>("ZALO_REFRESH_MARGIN_SECS", get("ZALO_REFRESH_MARGIN_SECS"))?
        {
            zalo.refresh_margin = Duration::from_secs(secs);
        }
        if let Some(secs) =
            parse::<u64>("ZALO_REQUEST_TIMEOUT_SECS", get("ZALO_REQUEST_TIMEOUT_SECS"))?
        {
            zalo.request_timeout = Duration::from_secs(secs);
        }
        if let Some(millis) = parse::<u64>("ZALO_BATCH_DELAY_MS", get("ZALO_BATCH_DELAY_MS"))? {
            zalo.batch_delay = Duration::from_millis(millis);
        }
        if let Some(url) = get("ZALO_OAUTH_BASE_URL") {
            zalo.oauth_base_url = url;
        }
        if let Some(url) = get("ZALO_OPENAPI_BASE_URL") {
            zalo.openapi_base_url = url;
        }

        zalo.validate()
            .map_err(|e| Error::config(e.to_string()))?;

        Ok(Self {
            server,
            log_dir: get("LOG_DIR").map(PathBuf::from),
            zalo,
            promotion_attachment_id: get("ZALO_PROMOTION_ATTACHMENT_ID"),
        })
    }
}

fn parse<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| Error::config(format!("{key}='{v}': {e}")))
        })
        .transpose()
}
