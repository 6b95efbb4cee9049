use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use wayfinder_core::{Gateway, GatewaysProvider, WayfinderError};

const CACHE_KEY: &str = "wayfinder-gateways-cache";

/// Per-origin client-side key-value store, the persistence substrate for
/// [`PersistentCachedGatewaysProvider`]. In a browser build this is backed
/// by `localStorage`/IndexedDB; here it is a capability trait so non-browser
/// hosts (tests, native CLIs) can supply an in-memory or on-disk impl.
#[async_trait]
pub trait PersistentKv: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String);
}

/// In-memory `PersistentKv`, useful for tests and native hosts that don't
/// need cross-process persistence.
#[derive(Default)]
pub struct InMemoryKv {
    inner: Mutex<std::collections::HashMap<String, String>>,
}

#[async_trait]
impl PersistentKv for InMemoryKv {
    async fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.inner.lock().await.insert(key.to_string(), value);
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    gateways: Vec<String>,
    timestamp: i64,
    ttl_seconds: u64,
}

/// Same semantics as [`crate::cache::CachedGatewaysProvider`], but persists
/// the gateway list through a `PersistentKv` under a fixed key so it
/// survives across process/tab restarts.
pub struct PersistentCachedGatewaysProvider {
    inner: Arc<dyn GatewaysProvider>,
    kv: Arc<dyn PersistentKv>,
    ttl: Duration,
    inflight: Mutex<Option<futures_util::future::Shared<futures_util::future::BoxFuture<'static, Result<Vec<Gateway>, String>>>>>,
}

impl PersistentCachedGatewaysProvider {
    pub fn new(inner: Arc<dyn GatewaysProvider>, kv: Arc<dyn PersistentKv>, ttl: Duration) -> Self {
        Self {
            inner,
            kv,
            ttl,
            inflight: Mutex::new(None),
        }
    }

    async fn read_cache(&self) -> Option<Vec<Gateway>> {
        let raw = self.kv.get(CACHE_KEY).await?;
        let record: CacheRecord = serde_json::from_str(&raw).ok()?;
        let age = chrono::Utc::now().timestamp() - record.timestamp;
        if age < 0 || age as u64 >= record.ttl_seconds {
            return None;
        }
        let gateways: Vec<Gateway> = record
            .gateways
            .iter()
            .filter_map(|u| Gateway::parse(u).ok())
            .collect();
        if gateways.is_empty() {
            None
        } else {
            Some(gateways)
        }
    }

    async fn write_cache(&self, gateways: &[Gateway]) {
        let record = CacheRecord {
            gateways: gateways.iter().map(|g| g.as_str().to_string()).collect(),
            timestamp: chrono::Utc::now().timestamp(),
            ttl_seconds: self.ttl.as_secs(),
        };
        if let Ok(json) = serde_json::to_string(&record) {
            self.kv.set(CACHE_KEY, json).await;
        }
    }
}

#[async_trait]
impl GatewaysProvider for PersistentCachedGatewaysProvider {
    async fn get_gateways(&self) -> Result<Vec<Gateway>, WayfinderError> {
        if let Some(list) = self.read_cache().await {
            return Ok(list);
        }

        let fut = {
            let mut guard = self.inflight.lock().await;
            if let Some(fut) = &*guard {
                fut.clone()
            } else {
                use futures_util::FutureExt;
                let inner = Arc::clone(&self.inner);
                let boxed: futures_util::future::BoxFuture<'static, Result<Vec<Gateway>, String>> =
                    async move { inner.get_gateways().await.map_err(|e| e.to_string()) }.boxed();
                let shared = boxed.shared();
                *guard = Some(shared.clone());
                shared
            }
        };

        let result = fut.await;
        self.inflight.lock().await.take();

        match result {
            Ok(list) => {
                self.write_cache(&list).await;
                Ok(list)
            }
            Err(e) => {
                // Stale-preference even if the in-process read_cache() above
                // already rejected it on TTL grounds: a refresh failure
                // still prefers any persisted value over an empty result.
                if let Some(raw) = self.kv.get(CACHE_KEY).await {
                    if let Ok(record) = serde_json::from_str::<CacheRecord>(&raw) {
                        let gateways: Vec<Gateway> = record
                            .gateways
                            .iter()
                            .filter_map(|u| Gateway::parse(u).ok())
                            .collect();
                        if !gateways.is_empty() {
                            tracing::error!(error = %e, "gateway refresh failed, serving persisted stale cache");
                            return Ok(gateways);
                        }
                    }
                }
                Err(WayfinderError::ProviderUnavailable(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProvider(Result<Vec<Gateway>, String>);

    #[async_trait]
    impl GatewaysProvider for FixedProvider {
        async fn get_gateways(&self) -> Result<Vec<Gateway>, WayfinderError> {
            self.0.clone().map_err(WayfinderError::ProviderUnavailable)
        }
    }

    fn gw(host: &str) -> Gateway {
        Gateway::parse(&format!("https://{host}")).unwrap()
    }

    #[tokio::test]
    async fn caches_through_kv_and_survives_new_instance() {
        let kv: Arc<dyn PersistentKv> = Arc::new(InMemoryKv::default());
        let provider = PersistentCachedGatewaysProvider::new(
            Arc::new(FixedProvider(Ok(vec![gw("a.example")]))),
            kv.clone(),
            Duration::from_secs(60),
        );
        let first = provider.get_gateways().await.unwrap();
        assert_eq!(first, vec![gw("a.example")]);

        // A brand new provider instance sharing the same kv sees the cached value.
        let provider2 = PersistentCachedGatewaysProvider::new(
            Arc::new(FixedProvider(Err("should not be called".into()))),
            kv,
            Duration::from_secs(60),
        );
        let second = provider2.get_gateways().await.unwrap();
        assert_eq!(second, vec![gw("a.example")]);
    }

    #[tokio::test]
    async fn expired_entry_triggers_refresh() {
        let kv: Arc<dyn PersistentKv> = Arc::new(InMemoryKv::default());
        let provider = PersistentCachedGatewaysProvider::new(
            Arc::new(FixedProvider(Ok(vec![gw("a.example")]))),
            kv.clone(),
            Duration::from_millis(1),
        );
        provider.get_gateways().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let provider2 = PersistentCachedGatewaysProvider::new(
            Arc::new(FixedProvider(Ok(vec![gw("b.example")]))),
            kv,
            Duration::from_millis(1),
        );
        let refreshed = provider2.get_gateways().await.unwrap();
        assert_eq!(refreshed, vec![gw("b.example")]);
    }
}
