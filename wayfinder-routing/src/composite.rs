use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use wayfinder_core::{Gateway, RoutingStrategy, SelectGatewayInput, WayfinderError};

/// Wraps a base strategy and verifies its choice with a single HEAD request;
/// on failure, asks the base for a fresh selection and retries up to
/// `retries` times before giving up with `NoHealthyGateway`.
pub struct Ping {
    client: reqwest::Client,
    base: Arc<dyn RoutingStrategy>,
    retries: u32,
    timeout: Duration,
}

impl Ping {
    pub fn new(client: reqwest::Client, base: Arc<dyn RoutingStrategy>) -> Self {
        Self {
            client,
            base,
            retries: 5,
            timeout: Duration::from_millis(500),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn verify(&self, gateway: &Gateway, input: &SelectGatewayInput) -> bool {
        let path = input.path.clone().unwrap_or_default();
        let url = gateway.request_url(input.subdomain.as_deref(), &path);
        matches!(
            tokio::time::timeout(self.timeout, self.client.head(&url).send()).await,
            Ok(Ok(resp)) if resp.status().is_success()
        )
    }
}

#[async_trait]
impl RoutingStrategy for Ping {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        for _ in 0..=self.retries {
            let candidate = self.base.select_gateway(input.clone()).await?;
            if self.verify(&candidate, &input).await {
                return Ok(candidate);
            }
        }
        Err(WayfinderError::NoHealthyGateway)
    }
}

/// Tries strategies in declaration order, returning the first success.
/// Fails with `AllStrategiesFailed` only if every strategy fails.
pub struct Composite {
    strategies: Vec<Arc<dyn RoutingStrategy>>,
}

impl Composite {
    pub fn new(strategies: Vec<Arc<dyn RoutingStrategy>>) -> Result<Self, WayfinderError> {
        if strategies.is_empty() {
            return Err(WayfinderError::Internal(
                "Composite requires at least one strategy".into(),
            ));
        }
        Ok(Self { strategies })
    }
}

#[async_trait]
impl RoutingStrategy for Composite {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        for strategy in &self.strategies {
            if let Ok(gateway) = strategy.select_gateway(input.clone()).await {
                return Ok(gateway);
            }
        }
        Err(WayfinderError::AllStrategiesFailed)
    }
}

/// `Ping(Static(preferred), retries=1, timeout=1s)` followed by a
/// user-supplied fallback (default `FastestPing`).
pub struct PreferredWithFallback {
    inner: Composite,
}

impl PreferredWithFallback {
    pub fn new(client: reqwest::Client, preferred: Gateway, fallback: Arc<dyn RoutingStrategy>) -> Self {
        let preferred_check = Ping::new(client, Arc::new(crate::simple::Static::new(preferred)))
            .with_retries(1)
            .with_timeout(Duration::from_millis(1000));
        Self {
            inner: Composite::new(vec![Arc::new(preferred_check), fallback])
                .expect("two strategies are never empty"),
        }
    }
}

#[async_trait]
impl RoutingStrategy for PreferredWithFallback {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        self.inner.select_gateway(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct AlwaysFails;
    #[async_trait]
    impl RoutingStrategy for AlwaysFails {
        async fn select_gateway(&self, _input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
            Err(WayfinderError::NoHealthyGateway)
        }
    }

    struct CountingThenSucceeds {
        calls: Arc<AtomicUsize>,
        gateway: Gateway,
    }
    #[async_trait]
    impl RoutingStrategy for CountingThenSucceeds {
        async fn select_gateway(&self, _input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.gateway.clone())
        }
    }

    #[tokio::test]
    async fn ping_accepts_a_healthy_base_choice() {
        let healthy = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&healthy)
            .await;

        let gateway = Gateway::parse(&healthy.uri()).unwrap();
        let base = Arc::new(crate::simple::Static::new(gateway.clone()));
        let ping = Ping::new(reqwest::Client::new(), base);
        assert_eq!(
            ping.select_gateway(SelectGatewayInput::default()).await.unwrap(),
            gateway
        );
    }

    #[tokio::test]
    async fn ping_retries_against_fresh_base_selections_then_fails() {
        let down = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&down)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let base = Arc::new(CountingThenSucceeds {
            calls: calls.clone(),
            gateway: Gateway::parse(&down.uri()).unwrap(),
        });
        let ping = Ping::new(reqwest::Client::new(), base).with_retries(2);
        assert!(matches!(
            ping.select_gateway(SelectGatewayInput::default()).await,
            Err(WayfinderError::NoHealthyGateway)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn composite_returns_first_success() {
        let gateway = Gateway::parse("https://second.example").unwrap();
        let strategies: Vec<Arc<dyn RoutingStrategy>> = vec![
            Arc::new(AlwaysFails),
            Arc::new(crate::simple::Static::new(gateway.clone())),
        ];
        let composite = Composite::new(strategies).unwrap();
        assert_eq!(
            composite.select_gateway(SelectGatewayInput::default()).await.unwrap(),
            gateway
        );
    }

    #[tokio::test]
    async fn composite_fails_when_all_fail() {
        let strategies: Vec<Arc<dyn RoutingStrategy>> = vec![Arc::new(AlwaysFails), Arc::new(AlwaysFails)];
        let composite = Composite::new(strategies).unwrap();
        assert!(matches!(
            composite.select_gateway(SelectGatewayInput::default()).await,
            Err(WayfinderError::AllStrategiesFailed)
        ));
    }

    #[tokio::test]
    async fn composite_requires_at_least_one_strategy() {
        assert!(Composite::new(vec![]).is_err());
    }

    #[tokio::test]
    async fn preferred_with_fallback_uses_fallback_when_preferred_is_unhealthy() {
        let down = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&down)
            .await;

        let fallback_gateway = Gateway::parse("https://fallback.example").unwrap();
        let fallback: Arc<dyn RoutingStrategy> = Arc::new(crate::simple::Static::new(fallback_gateway.clone()));
        let preferred = Gateway::parse(&down.uri()).unwrap();
        let strategy = PreferredWithFallback::new(reqwest::Client::new(), preferred, fallback);
        assert_eq!(
            strategy.select_gateway(SelectGatewayInput::default()).await.unwrap(),
            fallback_gateway
        );
    }
}
