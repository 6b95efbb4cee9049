use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use wayfinder_core::{Gateway, GatewaysProvider, Limiter, RoutingStrategy, SelectGatewayInput, WayfinderError};

/// Concurrent HEAD probes, bounded by `concurrency`, each under
/// `timeout`. The first 2xx response cancels the rest and wins; ties at the
/// 2xx check are broken by arrival order since the winner is whichever probe
/// task's result reaches the select loop first.
pub struct FastestPing {
    client: reqwest::Client,
    provider: Option<Arc<dyn GatewaysProvider>>,
    concurrency: usize,
    timeout: Duration,
}

impl FastestPing {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            provider: None,
            concurrency: 50,
            timeout: Duration::from_millis(500),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn GatewaysProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn resolve_gateways(&self, input: &SelectGatewayInput) -> Result<Vec<Gateway>, WayfinderError> {
        if let Some(list) = &input.gateways {
            if !list.is_empty() {
                return Ok(list.clone());
            }
        }
        match &self.provider {
            Some(provider) => provider.get_gateways().await,
            None => Err(WayfinderError::NoGateways),
        }
    }
}

#[async_trait]
impl RoutingStrategy for FastestPing {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError> {
        let gateways = self.resolve_gateways(&input).await?;
        if gateways.is_empty() {
            return Err(WayfinderError::NoGateways);
        }

        let path = input.path.clone().unwrap_or_default();
        let subdomain = input.subdomain.clone();
        let limiter = Arc::new(Limiter::new(self.concurrency.max(1)));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Option<Gateway>>();

        let mut handles = Vec::with_capacity(gateways.len());
        for gateway in gateways {
            let client = self.client.clone();
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();
            let path = path.clone();
            let subdomain = subdomain.clone();
            let timeout = self.timeout;
            handles.push(tokio::spawn(async move {
                let Some(permit) = limiter.acquire().await else {
                    return;
                };
                let url = gateway.request_url(subdomain.as_deref(), &path);
                let result = tokio::time::timeout(timeout, client.head(&url).send()).await;
                drop(permit);
                let success = matches!(&result, Ok(Ok(resp)) if resp.status().is_success());
                let _ = tx.send(if success { Some(gateway) } else { None });
            }));
        }
        drop(tx);

        let mut winner = None;
        let mut remaining = handles.len();
        while remaining > 0 {
            match rx.recv().await {
                Some(Some(gateway)) => {
                    winner = Some(gateway);
                    break;
                }
                Some(None) => remaining -= 1,
                None => break,
            }
        }

        limiter.clear_queue();
        for handle in handles {
            handle.abort();
        }

        winner.ok_or(WayfinderError::NoHealthyGateway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input_with(gateways: Vec<Gateway>) -> SelectGatewayInput {
        SelectGatewayInput {
            gateways: Some(gateways),
            path: Some("ping".to_string()),
            subdomain: None,
        }
    }

    #[tokio::test]
    async fn selects_the_fastest_responder() {
        let fast = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&fast)
            .await;

        let slow = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&slow)
            .await;

        let gws = vec![
            Gateway::parse(&slow.uri()).unwrap(),
            Gateway::parse(&fast.uri()).unwrap(),
        ];
        let strategy = FastestPing::new(reqwest::Client::new()).with_timeout(Duration::from_millis(500));
        let winner = strategy.select_gateway(input_with(gws.clone())).await.unwrap();
        assert_eq!(winner, gws[1]);
    }

    #[tokio::test]
    async fn excludes_responders_past_the_timeout() {
        let slow = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&slow)
            .await;

        let gws = vec![Gateway::parse(&slow.uri()).unwrap()];
        let strategy = FastestPing::new(reqwest::Client::new()).with_timeout(Duration::from_millis(100));
        assert!(matches!(
            strategy.select_gateway(input_with(gws)).await,
            Err(WayfinderError::NoHealthyGateway)
        ));
    }

    #[tokio::test]
    async fn all_failing_is_no_healthy_gateway() {
        let down = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&down)
            .await;

        let gws = vec![Gateway::parse(&down.uri()).unwrap()];
        let strategy = FastestPing::new(reqwest::Client::new());
        assert!(matches!(
            strategy.select_gateway(input_with(gws)).await,
            Err(WayfinderError::NoHealthyGateway)
        ));
    }

    #[tokio::test]
    async fn empty_gateway_list_is_no_gateways() {
        let strategy = FastestPing::new(reqwest::Client::new());
        assert!(matches!(
            strategy.select_gateway(input_with(vec![])).await,
            Err(WayfinderError::NoGateways)
        ));
    }
}
