use dashmap::DashMap;
use tokio::time::{Duration, Instant};
use wayfinder_core::VerificationResult;

struct Entry {
    result: VerificationResult,
    expires_at: Instant,
}

/// Bounded-lifetime cache of recursive manifest resource verifications,
/// keyed by txId. Writes are upsert; reads prune expired entries lazily
/// rather than via a background sweep.
pub struct ManifestVerificationCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl ManifestVerificationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, tx_id: &str) -> Option<VerificationResult> {
        if let Some(entry) = self.entries.get(tx_id) {
            if entry.expires_at > Instant::now() {
                return Some(entry.result.clone());
            }
        }
        self.entries.remove(tx_id);
        None
    }

    pub fn set(&self, tx_id: String, result: VerificationResult) {
        self.entries.insert(
            tx_id,
            Entry {
                result,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Removes every entry whose TTL has elapsed. Exposed for callers that
    /// want a deterministic sweep point (e.g. tests, a periodic task)
    /// instead of relying purely on lazy pruning at `get()`.
    pub fn prune(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;

    fn result(tx_id: &str, verified: bool) -> VerificationResult {
        VerificationResult {
            tx_id: tx_id.to_string(),
            verified,
            hash: None,
            error: None,
            timestamp: chrono::Utc::now(),
            content: None,
            content_type: None,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn set_then_get_within_ttl_returns_the_same_result() {
        let cache = ManifestVerificationCache::new(Duration::from_secs(60));
        cache.set("tx1".into(), result("tx1", true));
        let got = cache.get("tx1").unwrap();
        assert!(got.verified);
    }

    #[tokio::test]
    async fn entry_is_absent_after_ttl_elapses() {
        let cache = ManifestVerificationCache::new(Duration::from_millis(5));
        cache.set("tx1".into(), result("tx1", true));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("tx1").is_none());
    }

    #[tokio::test]
    async fn prune_removes_exactly_the_expired_entries() {
        let cache = ManifestVerificationCache::new(Duration::from_millis(10));
        cache.set("expires-soon".into(), result("expires-soon", true));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.set("fresh".into(), result("fresh", true));

        cache.prune();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
    }

    #[test]
    fn captured_content_survives_round_trip() {
        let cache = ManifestVerificationCache::new(Duration::from_secs(60));
        let mut r = result("tx1", true);
        r.content = Some(Bytes::from_static(b"hello"));
        cache.set("tx1".into(), r);
        assert_eq!(cache.get("tx1").unwrap().content, Some(Bytes::from_static(b"hello")));
    }
}
