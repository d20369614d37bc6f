//! Memoized OAuth client-credentials token.
//!
//! The holder is the single funnel for issuing tokens: the mutex is held
//! across the token request, so concurrent cell fetches queue behind one
//! round-trip instead of each authenticating.

use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::GatewayError;

/// Seconds shaved off the advertised lifetime so a token is never used
/// in its last moments.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    expiry_buffer: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        TokenCache::new(DEFAULT_EXPIRY_BUFFER)
    }
}

impl TokenCache {
    pub fn new(expiry_buffer: Duration) -> Self {
        TokenCache {
            slot: Mutex::new(None),
            expiry_buffer,
        }
    }

    /// Return the held token, or run `fetch` to issue a new one.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken, GatewayError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }
        let issued = fetch().await?;
        let lifetime = Duration::from_secs(issued.expires_in).saturating_sub(self.expiry_buffer);
        *slot = Some(CachedToken {
            value: issued.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(issued.access_token)
    }

    /// Drop the held token, e.g. after a data endpoint answered 401.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn issue(counter: &AtomicUsize, expires_in: u64) -> Result<IssuedToken, GatewayError> {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(IssuedToken {
            access_token: format!("token-{n}"),
            expires_in,
        })
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_token() {
        let cache = TokenCache::default();
        let issued = AtomicUsize::new(0);
        let calls = (0..8).map(|_| {
            cache.get_or_fetch(|| async {
                tokio::task::yield_now().await;
                issue(&issued, 3600)
            })
        });
        let tokens = futures::future::join_all(calls).await;
        assert_eq!(issued.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| matches!(t, Ok(v) if v == "token-0")));
    }

    #[tokio::test]
    async fn expired_tokens_are_refreshed() {
        let cache = TokenCache::default();
        let issued = AtomicUsize::new(0);
        // a lifetime shorter than the buffer is already expired
        let first = cache.get_or_fetch(|| async { issue(&issued, 30) }).await.unwrap();
        let second = cache.get_or_fetch(|| async { issue(&issued, 30) }).await.unwrap();
        assert_eq!(first, "token-0");
        assert_eq!(second, "token-1");
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = TokenCache::default();
        let err = cache
            .get_or_fetch(|| async { Err(GatewayError::Auth("401 Unauthorized".into())) })
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        let issued = AtomicUsize::new(0);
        let token = cache.get_or_fetch(|| async { issue(&issued, 3600) }).await.unwrap();
        assert_eq!(token, "token-0");
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_token() {
        let cache = TokenCache::default();
        let issued = AtomicUsize::new(0);
        cache.get_or_fetch(|| async { issue(&issued, 3600) }).await.unwrap();
        cache.invalidate().await;
        let token = cache.get_or_fetch(|| async { issue(&issued, 3600) }).await.unwrap();
        assert_eq!(token, "token-1");
    }
}
