use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use wayfinder_core::{Gateway, GatewaysProvider, WayfinderError};

type InflightFuture = Shared<BoxFuture<'static, Result<Vec<Gateway>, String>>>;

struct State {
    cached: Option<(Vec<Gateway>, Instant)>,
    inflight: Option<InflightFuture>,
}

/// In-memory, single-flight, TTL-bounded wrapper around a `GatewaysProvider`.
///
/// Concurrent callers during a refresh share the same in-flight future. A
/// refresh failure returns the previous list (never an empty one) and logs
/// the error; only a failure with no prior cached value propagates.
pub struct CachedGatewaysProvider {
    inner: Arc<dyn GatewaysProvider>,
    ttl: Duration,
    state: Mutex<State>,
}

impl CachedGatewaysProvider {
    pub fn new(inner: Arc<dyn GatewaysProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            state: Mutex::new(State {
                cached: None,
                inflight: None,
            }),
        }
    }

    fn fresh(cached: &Option<(Vec<Gateway>, Instant)>, ttl: Duration) -> Option<Vec<Gateway>> {
        cached.as_ref().and_then(|(list, ts)| {
            if ts.elapsed() < ttl {
                Some(list.clone())
            } else {
                None
            }
        })
    }

    async fn refresh_or_join(&self) -> InflightFuture {
        let mut guard = self.state.lock().await;
        if let Some(fut) = &guard.inflight {
            return fut.clone();
        }
        let inner = Arc::clone(&self.inner);
        let fut: BoxFuture<'static, Result<Vec<Gateway>, String>> =
            async move { inner.get_gateways().await.map_err(|e| e.to_string()) }.boxed();
        let shared = fut.shared();
        guard.inflight = Some(shared.clone());
        shared
    }
}

#[async_trait]
impl GatewaysProvider for CachedGatewaysProvider {
    async fn get_gateways(&self) -> Result<Vec<Gateway>, WayfinderError> {
        {
            let guard = self.state.lock().await;
            if let Some(list) = Self::fresh(&guard.cached, self.ttl) {
                return Ok(list);
            }
        }

        let fut = self.refresh_or_join().await;
        let result = fut.await;

        let mut guard = self.state.lock().await;
        guard.inflight = None;
        match result {
            Ok(list) => {
                guard.cached = Some((list.clone(), Instant::now()));
                Ok(list)
            }
            Err(e) => match &guard.cached {
                Some((list, _)) => {
                    tracing::error!(error = %e, "gateway refresh failed, serving stale cache");
                    Ok(list.clone())
                }
                None => Err(WayfinderError::ProviderUnavailable(e)),
            },
        }
    }
}
