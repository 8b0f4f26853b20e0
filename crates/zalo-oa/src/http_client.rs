use std::sync::OnceLock;

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::ZaloConfig;
use crate::error::{Result, ZaloError};

/// User agent sent on every request.
pub const USER_AGENT: &str = concat!("zalo-oa/", env!("CARGO_PKG_VERSION"));

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the HTTP client shared by the token refresher and the message API.
///
/// Every request is bounded by `config.request_timeout`; a zero timeout means
/// no bound.
pub fn build_client(config: &ZaloConfig) -> Result<Client> {
    install_rustls_provider();

    let mut builder = Client::builder().user_agent(USER_AGENT);
    if !config.request_timeout.is_zero() {
        builder = builder
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout);
    }

    Ok(builder.build()?)
}

/// Read a JSON response body.
///
/// Zalo reports most failures inside a `200 OK` envelope, so the body is
/// decoded first. A non-success status is only decoded when the body carries a
/// numeric `error` code; anything else (gateway pages, proxy JSON) becomes
/// [`ZaloError::Http`].
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    decode_body(status, &body)
}

fn decode_body<T: serde::de::DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    if !status.is_success() && !has_error_code(body) {
        return Err(ZaloError::Http {
            status: status.as_u16(),
            body: truncate_body(body),
        });
    }

    serde_json::from_str::<T>(body).map_err(|e| ZaloError::Decode(e.to_string()))
}

fn has_error_code(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .is_some_and(|value| value.get("error").is_some_and(|code| code.is_i64()))
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    if body.chars().count() <= LIMIT {
        return body.to_string();
    }
    let truncated: String = body.chars().take(LIMIT).collect();
    format!("{truncated}...")
}
