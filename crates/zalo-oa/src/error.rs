//! Error types for the Zalo client.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZaloError>;

/// Errors raised while talking to the Zalo APIs.
#[derive(Debug, Error)]
pub enum ZaloError {
    /// Transport failure (DNS, connect, TLS, broken body).
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Non-success HTTP status with a body that is not a Zalo envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Zalo answered with a non-zero `error` code.
    #[error("Zalo API error (code={code}): {message}")]
    Api { code: i64, message: String },

    /// No refresh token is configured, so the access token cannot be renewed.
    #[error("Missing refresh token")]
    MissingRefreshToken,

    /// Configuration rejected by [`crate::ZaloConfig::validate`].
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for ZaloError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err)
        }
    }
}

impl ZaloError {
    /// Upstream error code, if this error came from a Zalo envelope.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this error is transient and the call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
            || matches!(self, Self::Http { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_code() {
        let err = ZaloError::Api {
            code: -230,
            message: "User has not interacted".to_string(),
        };
        assert_eq!(err.code(), Some(-230));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("-230"));
    }

    #[test]
    fn test_http_error_transient_on_5xx() {
        let err = ZaloError::Http {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(err.is_transient());
        assert_eq!(err.code(), None);

        let err = ZaloError::Http {
            status: 404,
            body: String::new(),
        };
        assert!(!err.is_transient());
    }
}
