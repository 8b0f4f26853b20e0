//! Cached OA credential with coalesced refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::AccessTokenProvider;
use super::in_flight::InFlightRefresh;
use super::refresher::{RefreshedToken, TokenRefresher};
use crate::config::ZaloConfig;
use crate::error::ZaloError;

/// Outcome shared by every caller attached to one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Token to use: the new one on success, the last known one otherwise.
    pub access_token: String,
    /// Whether the upstream refresh succeeded.
    pub refreshed: bool,
    /// Refresh failure, if any.
    pub error: Option<String>,
}

/// Read-only snapshot for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    /// Whether the seed credential has been loaded.
    pub initialized: bool,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds until expiry; negative once expired.
    pub remaining_secs: Option<i64>,
    /// Remaining lifetime is within the refresh margin.
    pub needs_refresh: bool,
    /// A refresh is in flight.
    pub refreshing: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_refresh_error: Option<String>,
    pub refresh_attempts: u64,
    pub refresh_failures: u64,
}

#[derive(Debug, Clone)]
struct Credential {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    fn is_fresh(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        !self.access_token.is_empty() && self.expires_at.signed_duration_since(now) > margin
    }
}

#[derive(Default)]
struct TokenState {
    credential: Option<Credential>,
    in_flight: Option<Arc<InFlightRefresh>>,
    last_refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct Seed {
    access_token: String,
    refresh_token: String,
    lifetime: Duration,
}

struct Inner {
    refresher: Arc<dyn TokenRefresher>,
    seed: Seed,
    refresh_margin: TimeDelta,
    default_lifetime: Duration,
    state: Mutex<TokenState>,
    refresh_attempts: AtomicU64,
    refresh_failures: AtomicU64,
}

/// Keeps one OA access token valid.
///
/// The handle is cheap to clone; clones share the same credential. At most one
/// refresh call is in flight at any time: callers that find the token within
/// the refresh margin attach to the pending refresh instead of starting their
/// own. Refresh failures never propagate, the last known token is returned.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Create a manager seeded from `config`. No network call happens here.
    pub fn new(config: &ZaloConfig, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                refresher,
                seed: Seed {
                    access_token: config.access_token.clone(),
                    refresh_token: config.refresh_token.clone(),
                    lifetime: config.initial_token_lifetime,
                },
                refresh_margin: to_time_delta(config.refresh_margin),
                default_lifetime: config.default_token_lifetime,
                state: Mutex::new(TokenState::default()),
                refresh_attempts: AtomicU64::new(0),
                refresh_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Return a token that is valid for at least the refresh margin, refreshing
    /// first when needed.
    pub async fn get_valid_access_token(&self) -> String {
        let pending = {
            let mut state = self.inner.state.lock();
            let now = Utc::now();
            self.inner.seed_if_needed(&mut state, now);

            if let Some(in_flight) = state.in_flight.clone() {
                in_flight
            } else {
                if let Some(credential) = &state.credential
                    && credential.is_fresh(now, self.inner.refresh_margin)
                {
                    return credential.access_token.clone();
                }
                debug!("Access token within refresh margin, refreshing");
                self.start_refresh(&mut state)
            }
        };

        pending.wait().await.access_token
    }

    /// Refresh regardless of expiry. Joins a refresh already in flight.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        let pending = {
            let mut state = self.inner.state.lock();
            self.inner.seed_if_needed(&mut state, Utc::now());

            match state.in_flight.clone() {
                Some(in_flight) => in_flight,
                None => self.start_refresh(&mut state),
            }
        };

        pending.wait().await
    }

    /// Snapshot of the credential state.
    pub fn get_token_info(&self) -> TokenInfo {
        let state = self.inner.state.lock();
        let now = Utc::now();
        let credential = state.credential.as_ref();

        TokenInfo {
            initialized: credential.is_some(),
            has_access_token: credential.is_some_and(|c| !c.access_token.is_empty()),
            has_refresh_token: credential.is_some_and(|c| !c.refresh_token.is_empty()),
            expires_at: credential.map(|c| c.expires_at),
            remaining_secs: credential
                .map(|c| c.expires_at.signed_duration_since(now).num_seconds()),
            needs_refresh: credential
                .is_some_and(|c| !c.is_fresh(now, self.inner.refresh_margin)),
            refreshing: state.in_flight.is_some(),
            last_refreshed_at: state.last_refreshed_at,
            last_refresh_error: state.last_error.clone(),
            refresh_attempts: self.inner.refresh_attempts.load(Ordering::Relaxed),
            refresh_failures: self.inner.refresh_failures.load(Ordering::Relaxed),
        }
    }

    /// Register a new in-flight refresh and spawn the task that runs it.
    ///
    /// Must be called with the state lock held and no refresh in flight.
    fn start_refresh(&self, state: &mut TokenState) -> Arc<InFlightRefresh> {
        let request = Arc::new(InFlightRefresh::new());
        state.in_flight = Some(Arc::clone(&request));

        let refresh_token = state
            .credential
            .as_ref()
            .map(|c| c.refresh_token.clone())
            .unwrap_or_default();

        // The refresh runs detached so a caller dropping its future cannot
        // strand the other waiters.
        let guard = RefreshGuard {
            inner: Arc::clone(&self.inner),
            request: Arc::clone(&request),
        };
        tokio::spawn(guard.run(refresh_token));

        request
    }
}

#[async_trait]
impl AccessTokenProvider for TokenManager {
    async fn access_token(&self) -> String {
        self.get_valid_access_token().await
    }
}

impl Inner {
    /// Load the seed credential on first use.
    fn seed_if_needed(&self, state: &mut TokenState, now: DateTime<Utc>) {
        if state.credential.is_some() {
            return;
        }

        // An empty seed token is treated as already expired.
        let expires_at = if self.seed.access_token.is_empty() {
            now
        } else {
            deadline(now, self.seed.lifetime)
        };

        debug!(
            has_access_token = !self.seed.access_token.is_empty(),
            has_refresh_token = !self.seed.refresh_token.is_empty(),
            %expires_at,
            "Seeding Zalo OA credential"
        );

        state.credential = Some(Credential {
            access_token: self.seed.access_token.clone(),
            refresh_token: self.seed.refresh_token.clone(),
            expires_at,
        });
    }

    fn current_access_token(state: &TokenState) -> String {
        state
            .credential
            .as_ref()
            .map(|c| c.access_token.clone())
            .unwrap_or_default()
    }

    /// Apply a refresh result to the cached credential and detach the request.
    fn finish(
        &self,
        request: &Arc<InFlightRefresh>,
        result: Result<RefreshedToken, ZaloError>,
    ) -> RefreshOutcome {
        let mut state = self.state.lock();
        let now = Utc::now();

        let outcome = match result {
            Ok(refreshed) => {
                let lifetime = refreshed.expires_in.unwrap_or(self.default_lifetime);
                let expires_at = deadline(now, lifetime);

                let credential = state.credential.get_or_insert_with(|| Credential {
                    access_token: String::new(),
                    refresh_token: String::new(),
                    expires_at: now,
                });
                credential.access_token = refreshed.access_token.clone();
                if let Some(refresh_token) = refreshed.refresh_token {
                    credential.refresh_token = refresh_token;
                }
                credential.expires_at = expires_at;

                state.last_refreshed_at = Some(now);
                state.last_error = None;

                info!(%expires_at, "Zalo OA access token refreshed");

                RefreshOutcome {
                    access_token: refreshed.access_token,
                    refreshed: true,
                    error: None,
                }
            }
            Err(e) => {
                self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Zalo OA token refresh failed, keeping current token");

                state.last_error = Some(e.to_string());

                RefreshOutcome {
                    access_token: Self::current_access_token(&state),
                    refreshed: false,
                    error: Some(e.to_string()),
                }
            }
        };

        if state
            .in_flight
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, request))
        {
            state.in_flight = None;
        }

        outcome
    }
}

/// Owns one in-flight refresh until its outcome is published.
///
/// If the task is torn down before finishing (runtime shutdown, panicking
/// refresher), `Drop` releases the waiters with the current token.
struct RefreshGuard {
    inner: Arc<Inner>,
    request: Arc<InFlightRefresh>,
}

impl RefreshGuard {
    async fn run(self, refresh_token: String) {
        self.inner.refresh_attempts.fetch_add(1, Ordering::Relaxed);

        let result = if refresh_token.is_empty() {
            Err(ZaloError::MissingRefreshToken)
        } else {
            self.inner.refresher.refresh(&refresh_token).await
        };

        let outcome = self.inner.finish(&self.request, result);
        self.request.complete(outcome);
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if self.request.is_complete() {
            return;
        }

        let access_token = {
            let mut state = self.inner.state.lock();
            if state
                .in_flight
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &self.request))
            {
                state.in_flight = None;
            }
            Inner::current_access_token(&state)
        };

        self.request.complete(RefreshOutcome {
            access_token,
            refreshed: false,
            error: Some("refresh task aborted".to_string()),
        });
    }
}

fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn deadline(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_time_delta(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::Result;

    /// Refresher that counts calls and answers after a short delay.
    struct FakeRefresher {
        calls: AtomicUsize,
        seen_refresh_tokens: Mutex<Vec<String>>,
        delay: Duration,
        respond: Box<dyn Fn(usize) -> Result<RefreshedToken> + Send + Sync>,
    }

    impl FakeRefresher {
        fn new(
            delay: Duration,
            respond: impl Fn(usize) -> Result<RefreshedToken> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen_refresh_tokens: Mutex::new(Vec::new()),
                delay,
                respond: Box::new(respond),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen_refresh_tokens.lock().push(refresh_token.to_string());
            tokio::time::sleep(self.delay).await;
            (self.respond)(n)
        }
    }

    fn token(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> RefreshedToken {
        RefreshedToken {
            access_token: access.to_string(),
            refresh_token: refresh.map(String::from),
            expires_in: expires_in.map(Duration::from_secs),
        }
    }

    fn config(lifetime: Duration) -> ZaloConfig {
        ZaloConfig {
            app_id: "app".to_string(),
            access_token: "seed-at".to_string(),
            refresh_token: "seed-rt".to_string(),
            initial_token_lifetime: lifetime,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_valid_seed_returned_without_refresh() {
        let refresher = FakeRefresher::new(Duration::ZERO, |_| Ok(token("new", None, None)));
        let manager = TokenManager::new(&config(Duration::from_secs(3600)), refresher.clone());

        assert_eq!(manager.get_valid_access_token().await, "seed-at");
        assert_eq!(manager.get_valid_access_token().await, "seed-at");
        assert_eq!(refresher.calls(), 0);

        let info = manager.get_token_info();
        assert!(info.initialized);
        assert!(!info.needs_refresh);
        assert!(info.remaining_secs.unwrap() > 3500);
    }

    #[tokio::test]
    async fn test_expiring_seed_triggers_refresh() {
        let refresher =
            FakeRefresher::new(Duration::ZERO, |_| Ok(token("new-at", Some("new-rt"), Some(7200))));
        // Inside the 5 minute margin.
        let manager = TokenManager::new(&config(Duration::from_secs(120)), refresher.clone());

        assert_eq!(manager.get_valid_access_token().await, "new-at");
        assert_eq!(refresher.calls(), 1);
        assert_eq!(refresher.seen_refresh_tokens.lock()[0], "seed-rt");

        // Now valid for two hours: no further refresh.
        assert_eq!(manager.get_valid_access_token().await, "new-at");
        assert_eq!(refresher.calls(), 1);

        let info = manager.get_token_info();
        assert!(info.last_refreshed_at.is_some());
        assert!(info.remaining_secs.unwrap() > 7000);
        assert_eq!(info.refresh_attempts, 1);
        assert_eq!(info.refresh_failures, 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let refresher = FakeRefresher::new(Duration::from_millis(50), |n| {
            Ok(token(&format!("at-{n}"), None, Some(3600)))
        });
        let manager = TokenManager::new(&config(Duration::ZERO), refresher.clone());

        let calls = (0..20).map(|_| {
            let manager = manager.clone();
            async move { manager.get_valid_access_token().await }
        });
        let tokens = futures::future::join_all(calls).await;

        assert_eq!(refresher.calls(), 1);
        assert!(tokens.iter().all(|t| t == "at-1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_on_multi_thread_runtime() {
        let refresher = FakeRefresher::new(Duration::from_millis(50), |n| {
            Ok(token(&format!("at-{n}"), None, Some(3600)))
        });
        let manager = TokenManager::new(&config(Duration::ZERO), refresher.clone());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_valid_access_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "at-1");
        }
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_returns_stale_token() {
        let refresher = FakeRefresher::new(Duration::ZERO, |_| {
            Err(ZaloError::Api {
                code: -14014,
                message: "invalid refresh token".to_string(),
            })
        });
        let manager = TokenManager::new(&config(Duration::from_secs(60)), refresher.clone());

        assert_eq!(manager.get_valid_access_token().await, "seed-at");
        assert_eq!(refresher.calls(), 1);

        let info = manager.get_token_info();
        assert!(!info.refreshing);
        assert!(info.needs_refresh);
        assert!(info.last_refresh_error.unwrap().contains("-14014"));
        assert_eq!(info.refresh_failures, 1);

        // Still near expiry, so the next request tries again.
        assert_eq!(manager.get_valid_access_token().await, "seed-at");
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failed_refresh() {
        let refresher = FakeRefresher::new(Duration::from_millis(30), |_| {
            Err(ZaloError::Http {
                status: 500,
                body: "boom".to_string(),
            })
        });
        let manager = TokenManager::new(&config(Duration::ZERO), refresher.clone());

        let calls = (0..8).map(|_| {
            let manager = manager.clone();
            async move { manager.get_valid_access_token().await }
        });
        let tokens = futures::future::join_all(calls).await;

        assert_eq!(refresher.calls(), 1);
        assert!(tokens.iter().all(|t| t == "seed-at"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_degrades_without_call() {
        let refresher = FakeRefresher::new(Duration::ZERO, |_| Ok(token("new", None, None)));
        let config = ZaloConfig {
            access_token: "seed-at".to_string(),
            initial_token_lifetime: Duration::ZERO,
            ..Default::default()
        };
        let manager = TokenManager::new(&config, refresher.clone());

        assert_eq!(manager.get_valid_access_token().await, "seed-at");
        assert_eq!(refresher.calls(), 0);

        let info = manager.get_token_info();
        assert!(!info.has_refresh_token);
        assert_eq!(
            info.last_refresh_error.as_deref(),
            Some("Missing refresh token")
        );
    }

    #[tokio::test]
    async fn test_empty_seed_token_refreshes_immediately() {
        let refresher = FakeRefresher::new(Duration::ZERO, |_| Ok(token("fresh", None, None)));
        let config = ZaloConfig {
            app_id: "app".to_string(),
            refresh_token: "rt".to_string(),
            ..Default::default()
        };
        let manager = TokenManager::new(&config, refresher.clone());

        assert_eq!(manager.get_valid_access_token().await, "fresh");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_on_valid_token() {
        let refresher = FakeRefresher::new(Duration::from_millis(20), |n| {
            Ok(token(&format!("forced-{n}"), None, None))
        });
        let manager = TokenManager::new(&config(Duration::from_secs(3600)), refresher.clone());

        let (a, b) = tokio::join!(manager.force_refresh(), manager.force_refresh());
        assert_eq!(refresher.calls(), 1);
        assert_eq!(a, b);
        assert!(a.refreshed);
        assert_eq!(a.access_token, "forced-1");

        // Default lifetime applies when expires_in is absent.
        let remaining = manager.get_token_info().remaining_secs.unwrap();
        assert!(remaining > 86_000 && remaining <= 86_400);
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let refresher = FakeRefresher::new(Duration::ZERO, |n| match n {
            1 => Ok(token("at-1", Some("rt-1"), Some(3600))),
            2 => Ok(token("at-2", None, Some(3600))),
            _ => Ok(token("at-n", None, Some(3600))),
        });
        let manager = TokenManager::new(&config(Duration::ZERO), refresher.clone());

        manager.force_refresh().await;
        manager.force_refresh().await;
        manager.force_refresh().await;

        let seen = refresher.seen_refresh_tokens.lock().clone();
        assert_eq!(seen, vec!["seed-rt", "rt-1", "rt-1"]);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_strand_waiters() {
        let refresher =
            FakeRefresher::new(Duration::from_millis(40), |_| Ok(token("at", None, Some(3600))));
        let manager = TokenManager::new(&config(Duration::ZERO), refresher.clone());

        // First caller starts the refresh and gives up almost immediately.
        let first = tokio::time::timeout(
            Duration::from_millis(5),
            manager.get_valid_access_token(),
        )
        .await;
        assert!(first.is_err());

        assert_eq!(manager.get_valid_access_token().await, "at");
        assert_eq!(refresher.calls(), 1);
    }

    #[test]
    fn test_token_info_before_first_use() {
        let refresher = FakeRefresher::new(Duration::ZERO, |_| Ok(token("x", None, None)));
        let manager = TokenManager::new(&config(Duration::from_secs(60)), refresher);

        let info = manager.get_token_info();
        assert!(!info.initialized);
        assert!(!info.has_access_token);
        assert!(info.expires_at.is_none());
        assert!(!info.refreshing);
    }

    #[test]
    fn test_deadline_saturates() {
        let now = Utc::now();
        assert_eq!(deadline(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(deadline(now, Duration::ZERO), now);
    }
}
