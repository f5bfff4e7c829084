use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use replygate_store::traits::KvStore;

/// KV key namespace for cached judgments.
const CACHE_KEY_PREFIX: &str = "ai_decision_";

/// Persisted cache payload.
#[derive(Debug, Serialize, Deserialize)]
struct CachedDecision {
    decision: bool,
    /// Unix seconds at write time.
    timestamp: i64,
}

/// Judgment cache over a key-value store with passive expiry.
///
/// Entries are keyed by a content fingerprint only — not the conversation —
/// so byte-identical text in two conversations shares one cached decision.
/// Expired entries are treated as absent but stay on disk until overwritten;
/// no eviction sweep runs.
pub struct DecisionCache {
    store: Arc<dyn KvStore>,
    expiry_secs: u64,
}

impl DecisionCache {
    pub fn new(store: Arc<dyn KvStore>, expiry_secs: u64) -> Self {
        Self { store, expiry_secs }
    }

    /// Lowercase hex SHA-256 over the UTF-8 bytes of the judged text.
    pub fn fingerprint(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Cached decision for a fingerprint, `None` when absent or expired.
    ///
    /// Storage failures and malformed payloads degrade to a miss — the
    /// caller must never fail because the cache is unhealthy.
    pub async fn get(&self, fingerprint: &str) -> Option<bool> {
        self.get_at(fingerprint, chrono::Utc::now().timestamp()).await
    }

    async fn get_at(&self, fingerprint: &str, now: i64) -> Option<bool> {
        let key = cache_key(fingerprint);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let cached: CachedDecision = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                error!(key = %key, error = %e, "malformed cache payload, treating as miss");
                return None;
            }
        };

        if now - cached.timestamp > self.expiry_secs as i64 {
            debug!(key = %key, "cached decision expired");
            return None;
        }

        debug!(key = %key, decision = cached.decision, "cached decision hit");
        Some(cached.decision)
    }

    /// Store a decision. Last write wins; write failures are non-fatal.
    pub async fn put(&self, fingerprint: &str, decision: bool) {
        self.put_at(fingerprint, decision, chrono::Utc::now().timestamp())
            .await
    }

    async fn put_at(&self, fingerprint: &str, decision: bool, now: i64) {
        let key = cache_key(fingerprint);
        let payload = CachedDecision {
            decision,
            timestamp: now,
        };
        let raw = match serde_json::to_string(&payload) {
            Ok(raw) => raw,
            Err(e) => {
                error!(key = %key, error = %e, "cache payload serialization failed");
                return;
            }
        };
        if let Err(e) = self.store.set(&key, &raw).await {
            warn!(key = %key, error = %e, "cache write failed");
        }
    }
}

fn cache_key(fingerprint: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{fingerprint}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use replygate_store::error::StoreError;

    use super::*;

    #[derive(Default)]
    struct MemoryKv {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    /// KV store whose reads and writes always fail.
    struct BrokenKv;

    #[async_trait]
    impl KvStore for BrokenKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Serialization("backend offline".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Serialization("backend offline".into()))
        }
    }

    fn cache(expiry_secs: u64) -> DecisionCache {
        DecisionCache::new(Arc::new(MemoryKv::default()), expiry_secs)
    }

    #[test]
    fn fingerprint_is_deterministic_and_content_sensitive() {
        let a = DecisionCache::fingerprint("hello");
        let b = DecisionCache::fingerprint("hello");
        let c = DecisionCache::fingerprint("hello!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn get_is_idempotent_within_expiry() {
        let cache = cache(300);
        let fp = DecisionCache::fingerprint("how do I configure X?");
        cache.put(&fp, false).await;
        assert_eq!(cache.get(&fp).await, Some(false));
        assert_eq!(cache.get(&fp).await, Some(false));
    }

    #[tokio::test]
    async fn entry_expires_after_the_window() {
        let cache = cache(300);
        let fp = DecisionCache::fingerprint("ok");
        let written_at = 1_000_000;
        cache.put_at(&fp, true, written_at).await;

        // just inside the window
        assert_eq!(cache.get_at(&fp, written_at + 299).await, Some(true));
        // boundary is inclusive: absent strictly after expiry
        assert_eq!(cache.get_at(&fp, written_at + 300).await, Some(true));
        assert_eq!(cache.get_at(&fp, written_at + 301).await, None);
    }

    #[tokio::test]
    async fn put_overwrites_unconditionally() {
        let cache = cache(300);
        let fp = DecisionCache::fingerprint("msg");
        cache.put(&fp, true).await;
        cache.put(&fp, false).await;
        assert_eq!(cache.get(&fp).await, Some(false));
    }

    #[tokio::test]
    async fn malformed_payload_reads_as_miss() {
        let kv = Arc::new(MemoryKv::default());
        kv.set(&cache_key("deadbeef"), "not json").await.unwrap();
        let cache = DecisionCache::new(kv, 300);
        assert_eq!(cache.get("deadbeef").await, None);
    }

    #[tokio::test]
    async fn broken_store_never_fails_the_caller() {
        let cache = DecisionCache::new(Arc::new(BrokenKv), 300);
        let fp = DecisionCache::fingerprint("msg");
        assert_eq!(cache.get(&fp).await, None);
        // write failure is swallowed
        cache.put(&fp, true).await;
    }
}
