use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wayfinder_core::{Gateway, GatewaysProvider, RoutingStrategy, SelectGatewayInput, WayfinderError};

/// Resolves the gateway list for a selection call: use the input's list if
/// non-empty, otherwise fall back to the injected provider. Empty input with
/// no provider (or an empty provider result) is `NoGateways`.
async fn resolve_gateways(
    input: &SelectGatewayInput,
    provider: Option<&Arc<dyn GatewaysProvider>>,
) -> Result<Vec<Gateway>, WayfinderError> {
    if let Some(list) = &input.gateways {
        if !list.is_empty() {
            return Ok(list.clone());
        }
    }
    match provider {
        Some(provider) => provider.get_gateways().await,
        None => Err(WayfinderError::NoGateways),
    }
}

/// Uniform random pick, unbiased over `[0, n)` via `rand`'s rejection
/// sampling (`gen_range`), not a naive modulo.
#[derive(Default)]
pub struct Random {
    provider: Option<Arc<dyn GatewaysProvider>>,
}

impl Random {
    pub fn new() -> Self {
        Self { provider: None }
    }

    pub fn with_provider(provider: Arc<dyn GatewaysProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }
}

#[async_trait]
impl RoutingStrategy for Random {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        let gateways = resolve_gateways(&input, self.provider.as_ref()).await?;
        if gateways.is_empty() {
            return Err(WayfinderError::NoGateways);
        }
        let index = rand::thread_rng().gen_range(0..gateways.len());
        Ok(gateways[index].clone())
    }
}

/// Monotonic cursor modulo list length. Each instance owns its own cursor;
/// no state is shared across instances. When no `gateways` are supplied, the
/// list is lazily loaded from the injected provider on first call and reused
/// for the cursor's subsequent indices.
pub struct RoundRobin {
    cursor: AtomicUsize,
    provider: Option<Arc<dyn GatewaysProvider>>,
    loaded: tokio::sync::Mutex<Option<Vec<Gateway>>>,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            provider: None,
            loaded: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_provider(provider: Arc<dyn GatewaysProvider>) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            provider: Some(provider),
            loaded: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl RoutingStrategy for RoundRobin {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        if let Some(list) = &input.gateways {
            if !list.is_empty() {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % list.len();
                return Ok(list[index].clone());
            }
        }

        let mut guard = self.loaded.lock().await;
        if guard.is_none() {
            let provider = self.provider.as_ref().ok_or(WayfinderError::NoGateways)?;
            let fetched = provider.get_gateways().await?;
            if fetched.is_empty() {
                return Err(WayfinderError::NoGateways);
            }
            *guard = Some(fetched);
        }
        let list = guard.as_ref().unwrap();
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % list.len();
        Ok(list[index].clone())
    }
}

/// Always returns the gateway it was constructed with, regardless of what
/// `select_gateway` is called with. Logs a warning if the caller passed a
/// non-empty `gateways` list, since it will be silently ignored.
pub struct Static {
    gateway: Gateway,
}

impl Static {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl RoutingStrategy for Static {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        if matches!(&input.gateways, Some(list) if !list.is_empty()) {
            tracing::warn!("Static routing strategy ignores the supplied gateway list");
        }
        Ok(self.gateway.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn gateways(n: usize) -> Vec<Gateway> {
        (0..n)
            .map(|i| Gateway::parse(&format!("https://g{i}.example")).unwrap())
            .collect()
    }

    fn input(gateways: Vec<Gateway>) -> SelectGatewayInput {
        SelectGatewayInput {
            gateways: Some(gateways),
            path: None,
            subdomain: None,
        }
    }

    struct FixedProvider(Vec<Gateway>);

    #[async_trait]
    impl GatewaysProvider for FixedProvider {
        async fn get_gateways(&self) -> Result<Vec<Gateway>, WayfinderError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn random_picks_from_the_set_and_roughly_evenly() {
        let strategy = Random::new();
        let gws = gateways(4);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..400 {
            let chosen = strategy.select_gateway(input(gws.clone())).await.unwrap();
            assert!(gws.contains(&chosen));
            *counts.entry(chosen.as_str().to_string()).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        for count in counts.values() {
            assert!(*count > 40, "distribution too skewed: {counts:?}");
        }
    }

    #[tokio::test]
    async fn random_on_empty_list_is_no_gateways() {
        let strategy = Random::new();
        assert!(matches!(
            strategy.select_gateway(input(vec![])).await,
            Err(WayfinderError::NoGateways)
        ));
    }

    #[tokio::test]
    async fn round_robin_cycles_in_order() {
        let strategy = RoundRobin::new();
        let gws = gateways(3);
        let mut picks = Vec::new();
        for _ in 0..6 {
            picks.push(strategy.select_gateway(input(gws.clone())).await.unwrap());
        }
        assert_eq!(
            picks,
            vec![gws[0].clone(), gws[1].clone(), gws[2].clone(), gws[0].clone(), gws[1].clone(), gws[2].clone()]
        );
    }

    #[tokio::test]
    async fn two_round_robin_instances_do_not_share_state() {
        let a = RoundRobin::new();
        let b = RoundRobin::new();
        let gws = gateways(2);
        assert_eq!(a.select_gateway(input(gws.clone())).await.unwrap(), gws[0]);
        assert_eq!(b.select_gateway(input(gws.clone())).await.unwrap(), gws[0]);
    }

    #[tokio::test]
    async fn round_robin_lazy_loads_from_provider_on_first_call() {
        let gws = gateways(2);
        let strategy = RoundRobin::with_provider(Arc::new(FixedProvider(gws.clone())));
        let empty = SelectGatewayInput::default();
        assert_eq!(strategy.select_gateway(empty.clone()).await.unwrap(), gws[0]);
        assert_eq!(strategy.select_gateway(empty).await.unwrap(), gws[1]);
    }

    #[tokio::test]
    async fn static_always_returns_its_own_gateway() {
        let fixed = Gateway::parse("https://fixed.example").unwrap();
        let strategy = Static::new(fixed.clone());
        let other = gateways(2);
        assert_eq!(strategy.select_gateway(input(other)).await.unwrap(), fixed);
        assert_eq!(
            strategy.select_gateway(SelectGatewayInput::default()).await.unwrap(),
            fixed
        );
    }
}
