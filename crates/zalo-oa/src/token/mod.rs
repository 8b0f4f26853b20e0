//! OA access token lifecycle.
//!
//! - [`TokenRefresher`]: exchanges a refresh token for a new access token
//! - [`TokenManager`]: caches the credential and coalesces concurrent refreshes
//! - [`AccessTokenProvider`]: what message delivery depends on

mod in_flight;
mod manager;
mod refresher;

pub use manager::{RefreshOutcome, TokenInfo, TokenManager};
pub use refresher::{HttpTokenRefresher, RefreshedToken, TOKEN_PATH, TokenRefresher};

use async_trait::async_trait;

/// Source of a bearer credential for outbound calls.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Return a token to send upstream. Never fails; a stale token is returned
    /// when renewal is impossible and the upstream call surfaces the problem.
    async fn access_token(&self) -> String;
}
