//! Bearer token cache with single-flight refresh
//!
//! One cache per provider client. The cached token is served until less than
//! `refresh_margin` of its lifetime remains. Refresh happens while holding the
//! cache's async mutex, so concurrent callers that find the token stale queue
//! behind a single login and then reuse its result.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use core_kernel::PortError;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Holds at most one (token, expiry) pair
#[derive(Debug)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    lifetime: Duration,
    refresh_margin: Duration,
}

impl TokenCache {
    /// # Arguments
    ///
    /// * `lifetime` - How long a freshly fetched token is trusted
    /// * `refresh_margin` - Refresh once less than this remains
    pub fn new(lifetime: Duration, refresh_margin: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            lifetime,
            refresh_margin,
        }
    }

    /// Returns the cached token, or runs `fetch` to obtain a new one
    ///
    /// # Errors
    ///
    /// Propagates the error of `fetch`; the stale token (if any) is kept out
    /// of circulation.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, PortError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, PortError>>,
    {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();
        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > now + self.refresh_margin {
                return Ok(cached.token.clone());
            }
        }

        *slot = None;
        let token = fetch().await?;
        *slot = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + self.lifetime,
        });
        tracing::info!("gov_api.token_fetched");
        Ok(token)
    }

    /// Drops the cached token, e.g. after the provider rejected it
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
