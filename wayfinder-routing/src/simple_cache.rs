use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use wayfinder_core::{Gateway, RoutingStrategy, SelectGatewayInput, WayfinderError};

type InflightFuture = Shared<BoxFuture<'static, Result<Gateway, String>>>;

struct State {
    cached: Option<(Gateway, Instant)>,
    inflight: Option<InflightFuture>,
}

/// Memoises the inner strategy's selection for a TTL. Concurrent callers
/// during a refresh share the same in-flight future (single-flight); on
/// refresh failure the stale cached URL is returned if present, else the
/// error propagates.
pub struct SimpleCache {
    inner: Arc<dyn RoutingStrategy>,
    ttl: Duration,
    state: Mutex<State>,
}

impl SimpleCache {
    pub fn new(inner: Arc<dyn RoutingStrategy>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            state: Mutex::new(State {
                cached: None,
                inflight: None,
            }),
        }
    }

    fn fresh(cached: &Option<(Gateway, Instant)>, ttl: Duration) -> Option<Gateway> {
        cached.as_ref().and_then(|(gateway, ts)| {
            if ts.elapsed() < ttl {
                Some(gateway.clone())
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl RoutingStrategy for SimpleCache {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        {
            let guard = self.state.lock().await;
            if let Some(gateway) = Self::fresh(&guard.cached, self.ttl) {
                return Ok(gateway);
            }
        }

        let fut = {
            let mut guard = self.state.lock().await;
            if let Some(fut) = &guard.inflight {
                fut.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let fut: BoxFuture<'static, Result<Gateway, String>> = async move {
                    inner.select_gateway(input).await.map_err(|e| e.to_string())
                }
                .boxed();
                let shared = fut.shared();
                guard.inflight = Some(shared.clone());
                shared
            }
        };

        let result = fut.await;
        let mut guard = self.state.lock().await;
        guard.inflight = None;
        match result {
            Ok(gateway) => {
                guard.cached = Some((gateway.clone(), Instant::now()));
                Ok(gateway)
            }
            Err(e) => match &guard.cached {
                Some((gateway, _)) => {
                    tracing::error!(error = %e, "route refresh failed, serving stale selection");
                    Ok(gateway.clone())
                }
                None => Err(WayfinderError::NoHealthyGateway),
            },
        }
    }
}
