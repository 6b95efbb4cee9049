use async_trait::async_trait;
use serde::Deserialize;
use wayfinder_core::config::RankingKey;
use wayfinder_core::{Gateway, GatewaysProvider, WayfinderError};

const PAGE_SIZE: usize = 1000;
const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

/// Paginates an AR.IO-style gateway registry, filters by status, ranks by
/// the configured key, and truncates to `limit`.
pub struct NetworkGatewaysProvider {
    client: reqwest::Client,
    registry_url: String,
    ranking_key: RankingKey,
    limit: usize,
}

impl NetworkGatewaysProvider {
    pub fn new(client: reqwest::Client, registry_url: impl Into<String>, ranking_key: RankingKey, limit: usize) -> Self {
        Self {
            client,
            registry_url: registry_url.into(),
            ranking_key,
            limit,
        }
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RegistryPage, WayfinderError> {
        let mut req = self
            .client
            .get(&self.registry_url)
            .query(&[("limit", PAGE_SIZE.to_string())]);
        if let Some(cursor) = cursor {
            req = req.query(&[("cursor", cursor)]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| WayfinderError::ProviderUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(WayfinderError::ProviderUnavailable(format!(
                "registry returned {}",
                resp.status()
            )));
        }
        resp.json::<RegistryPage>()
            .await
            .map_err(|e| WayfinderError::ProviderUnavailable(e.to_string()))
    }

    fn rank_value(&self, node: &RegistryNode) -> f64 {
        match self.ranking_key {
            RankingKey::OperatorStake => node.operator_stake.unwrap_or(0.0),
            RankingKey::TotalDelegatedStake => node.total_delegated_stake.unwrap_or(0.0),
            RankingKey::StartTimestamp => node.start_timestamp.unwrap_or(0.0),
            RankingKey::PerformanceRatio => node.weights.as_ref().and_then(|w| w.performance_ratio).unwrap_or(0.0),
            RankingKey::CompositeWeight => node.weights.as_ref().and_then(|w| w.composite_weight).unwrap_or(0.0),
            RankingKey::PassedConsecutiveEpochs => node.stats.as_ref().and_then(|s| s.passed_consecutive_epochs).unwrap_or(0.0),
            RankingKey::TenureWeight => node.weights.as_ref().and_then(|w| w.tenure_weight).unwrap_or(0.0),
            RankingKey::StakeWeight => node.weights.as_ref().and_then(|w| w.stake_weight).unwrap_or(0.0),
            RankingKey::NormalizedComposite => node.weights.as_ref().and_then(|w| w.normalized_composite_weight).unwrap_or(0.0),
        }
    }
}

#[async_trait]
impl GatewaysProvider for NetworkGatewaysProvider {
    async fn get_gateways(&self) -> Result<Vec<Gateway>, WayfinderError> {
        let mut nodes: Vec<RegistryNode> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut consecutive_failures = 0u32;

        loop {
            match self.fetch_page(cursor.as_deref()).await {
                Ok(page) => {
                    consecutive_failures = 0;
                    nodes.extend(page.items.into_iter().filter(|n| n.status.as_deref() == Some("joined")));
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(error = %e, consecutive_failures, "registry page fetch failed");
                    if consecutive_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                        if nodes.is_empty() {
                            return Err(WayfinderError::ProviderUnavailable(format!(
                                "registry unreachable after {consecutive_failures} consecutive page failures"
                            )));
                        }
                        break;
                    }
                }
            }
        }

        if nodes.is_empty() {
            return Err(WayfinderError::ProviderUnavailable("registry returned no joined gateways".into()));
        }

        nodes.sort_by(|a, b| self.rank_value(b).partial_cmp(&self.rank_value(a)).unwrap_or(std::cmp::Ordering::Equal));
        nodes.truncate(self.limit);

        let gateways: Vec<Gateway> = nodes
            .into_iter()
            .filter_map(|n| Gateway::parse(&n.url()).ok())
            .collect();

        if gateways.is_empty() {
            return Err(WayfinderError::ProviderUnavailable("no gateways had a parseable url".into()));
        }
        Ok(gateways)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryPage {
    items: Vec<RegistryNode>,
    #[serde(rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistryNode {
    #[serde(rename = "settings")]
    settings: Option<RegistrySettings>,
    status: Option<String>,
    #[serde(rename = "operatorStake")]
    operator_stake: Option<f64>,
    #[serde(rename = "totalDelegatedStake")]
    total_delegated_stake: Option<f64>,
    #[serde(rename = "startTimestamp")]
    start_timestamp: Option<f64>,
    stats: Option<RegistryStats>,
    weights: Option<RegistryWeights>,
}

impl RegistryNode {
    fn url(&self) -> String {
        match &self.settings {
            Some(s) => {
                let protocol = s.protocol.as_deref().unwrap_or("https");
                match s.port {
                    Some(port) if port != 443 && port != 80 => format!("{protocol}://{}:{port}", s.fqdn),
                    _ => format!("{protocol}://{}", s.fqdn),
                }
            }
            None => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistrySettings {
    fqdn: String,
    protocol: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RegistryStats {
    #[serde(rename = "passedConsecutiveEpochs")]
    passed_consecutive_epochs: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RegistryWeights {
    #[serde(rename = "performanceRatio")]
    performance_ratio: Option<f64>,
    #[serde(rename = "compositeWeight")]
    composite_weight: Option<f64>,
    #[serde(rename = "tenureWeight")]
    tenure_weight: Option<f64>,
    #[serde(rename = "stakeWeight")]
    stake_weight: Option<f64>,
    #[serde(rename = "normalizedCompositeWeight")]
    normalized_composite_weight: Option<f64>,
}
