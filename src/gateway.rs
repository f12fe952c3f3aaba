//! Bearer-token state and the single-flight refresh gate.
//!
//! Every authorized request flows through [`ClientInner::send_authorized`]
//! (see `client.rs`): attach the current bearer, send, and on a 401 recover
//! through the [`RefreshGate`]. The gate guarantees at most one refresh call
//! is in flight process-wide; concurrent 401 observers park on a oneshot
//! waiter and are drained with the refresh outcome.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, RwLock},
};

use tokio::sync::oneshot;

use crate::{
    auth::TokenResponse,
    errors::{Error, Result, TransportError},
    http::parse_api_error_parts,
};

/// Shared cell holding the current access token.
///
/// Seeded by `AuthClient::login`, swapped by the refresh gate, cleared on
/// logout. Reads take a short lock; no await happens while holding it.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .expect("token store lock poisoned")
            .clone()
    }

    /// Store a token, stripping an accidental `Bearer ` prefix. A blank
    /// value clears the store.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let token = token
            .trim()
            .strip_prefix("Bearer ")
            .or_else(|| token.trim().strip_prefix("bearer "))
            .unwrap_or(token.trim())
            .to_string();
        *self.inner.write().expect("token store lock poisoned") = if token.is_empty() {
            None
        } else {
            Some(token)
        };
    }

    pub fn clear(&self) {
        *self.inner.write().expect("token store lock poisoned") = None;
    }
}

/// Trait for the operation that exchanges the refresh credential for a new
/// access token. Object-safe so the client can hold `Arc<dyn TokenRefresher>`.
pub trait TokenRefresher: Send + Sync {
    /// Perform one refresh call and return the new access token.
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Default refresher: `POST /auth/refresh` with the HTTP-only refresh cookie
/// carried by the shared reqwest cookie jar. Never routed back through the
/// 401 recovery path.
pub struct SessionRefresher {
    http: reqwest::Client,
    refresh_url: String,
}

impl SessionRefresher {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        Self {
            http,
            refresh_url: format!("{}/auth/refresh", base.trim_end_matches('/')),
        }
    }
}

impl TokenRefresher for SessionRefresher {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(&self.refresh_url)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|err| TransportError::connect("token refresh request failed", err))?;

            let status = resp.status();
            if !status.is_success() {
                let headers = resp.headers().clone();
                let body = resp.text().await.unwrap_or_default();
                return Err(parse_api_error_parts(status, &headers, body));
            }

            let token: TokenResponse = resp.json().await.map_err(TransportError::from_reqwest)?;
            Ok(token.access_token)
        })
    }
}

enum GateTicket {
    /// This caller won the race and must perform the refresh.
    Refresher,
    /// A refresh is already in flight; park until it settles.
    Waiter(oneshot::Receiver<Option<String>>),
}

#[derive(Default)]
struct GateInner {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<Option<String>>>,
}

/// Single-flight refresh coordinator.
///
/// Invariant: at most one refresh is in flight at a time; every caller that
/// observed `refreshing == true` is settled exactly once with the outcome of
/// that refresh. Constructed once per [`crate::Client`]; there is no global
/// state.
#[derive(Default)]
pub(crate) struct RefreshGate {
    inner: Mutex<GateInner>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn join(&self) -> GateTicket {
        let mut inner = self.inner.lock().expect("refresh gate lock poisoned");
        if inner.refreshing {
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            GateTicket::Waiter(rx)
        } else {
            inner.refreshing = true;
            GateTicket::Refresher
        }
    }

    /// Clear the in-flight flag and drain all waiters with the outcome.
    fn settle(&self, token: Option<&str>) {
        let waiters = {
            let mut inner = self.inner.lock().expect("refresh gate lock poisoned");
            inner.refreshing = false;
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(token.map(|t| t.to_string()));
        }
    }

    /// Reject every parked waiter without touching an in-flight refresh.
    /// Called on logout so no caller stays parked against a dead session.
    pub fn reject_pending(&self) {
        let waiters = {
            let mut inner = self.inner.lock().expect("refresh gate lock poisoned");
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(None);
        }
    }

    /// Obtain a fresh token, either by performing the refresh or by waiting
    /// on the one already in flight. Exactly one refresh call happens per
    /// settling cycle regardless of how many callers arrive.
    pub async fn fresh_token(
        &self,
        refresher: &dyn TokenRefresher,
        tokens: &TokenStore,
    ) -> Result<String> {
        match self.join() {
            GateTicket::Waiter(rx) => match rx.await {
                Ok(Some(token)) => Ok(token),
                // Rejected, or the refresher was dropped mid-flight.
                _ => Err(Error::AuthFailure),
            },
            GateTicket::Refresher => {
                tracing::debug!("access token expired, refreshing");
                match refresher.refresh().await {
                    Ok(token) => {
                        tokens.set(token.as_str());
                        self.settle(Some(&token));
                        tracing::debug!("token refresh succeeded");
                        Ok(token)
                    }
                    Err(err) => {
                        tokens.clear();
                        self.settle(None);
                        tracing::warn!(error = %err, "token refresh failed");
                        Err(Error::AuthFailure)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingRefresher {
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingRefresher {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail,
            }
        }
    }

    impl TokenRefresher for CountingRefresher {
        fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                // Hold the gate open long enough for waiters to pile up.
                tokio::time::sleep(Duration::from_millis(20)).await;
                if self.fail {
                    Err(Error::AuthFailure)
                } else {
                    Ok("t2".to_string())
                }
            })
        }
    }

    #[test]
    fn token_store_strips_bearer_prefix() {
        let store = TokenStore::new();
        store.set("Bearer abc123");
        assert_eq!(store.get().as_deref(), Some("abc123"));
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn token_store_treats_blank_as_empty() {
        let store = TokenStore::with_token("   ");
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let gate = Arc::new(RefreshGate::new());
        let refresher = Arc::new(CountingRefresher::new(false));
        let tokens = TokenStore::with_token("t1");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            let refresher = refresher.clone();
            let tokens = tokens.clone();
            handles.push(tokio::spawn(async move {
                gate.fresh_token(refresher.as_ref(), &tokens).await
            }));
        }

        for handle in handles {
            let token = handle.await.expect("join").expect("refresh outcome");
            assert_eq!(token, "t2");
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tokens.get().as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn failed_refresh_rejects_all_callers_and_clears_token() {
        let gate = Arc::new(RefreshGate::new());
        let refresher = Arc::new(CountingRefresher::new(true));
        let tokens = TokenStore::with_token("t1");

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            let refresher = refresher.clone();
            let tokens = tokens.clone();
            handles.push(tokio::spawn(async move {
                gate.fresh_token(refresher.as_ref(), &tokens).await
            }));
        }

        for handle in handles {
            let err = handle.await.expect("join").expect_err("should fail");
            assert!(matches!(err, Error::AuthFailure));
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn reject_pending_wakes_waiters_with_auth_failure() {
        let gate = Arc::new(RefreshGate::new());
        // Occupy the gate without ever settling.
        match gate.join() {
            GateTicket::Refresher => {}
            GateTicket::Waiter(_) => panic!("gate should be free"),
        }

        let waiter = {
            let gate = gate.clone();
            let tokens = TokenStore::new();
            tokio::spawn(async move {
                let refresher = CountingRefresher::new(false);
                gate.fresh_token(&refresher, &tokens).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        gate.reject_pending();
        let err = waiter.await.expect("join").expect_err("rejected");
        assert!(matches!(err, Error::AuthFailure));
    }
}
