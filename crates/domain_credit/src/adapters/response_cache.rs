//! TTL cache for provider responses

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// Keyed JSON responses with a fixed time-to-live
#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, (serde_json::Value, Instant)>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns a live entry; expired entries are treated as absent
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                tracing::debug!(cache_key = key, "gov_cache.hit");
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Inserts or replaces an entry
    pub async fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        let expires_at = Instant::now() + self.ttl;
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, exp)| *exp > Instant::now());
        entries.insert(key.into(), (value, expires_at));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
