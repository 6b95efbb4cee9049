use figment::providers::Env;
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Ranking key used by the network gateways provider to sort registry
/// results before truncating to `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankingKey {
    OperatorStake,
    TotalDelegatedStake,
    StartTimestamp,
    PerformanceRatio,
    CompositeWeight,
    PassedConsecutiveEpochs,
    TenureWeight,
    StakeWeight,
    NormalizedComposite,
}

impl Default for RankingKey {
    fn default() -> Self {
        RankingKey::NormalizedComposite
    }
}

/// Top-level WayFinder pipeline configuration.
///
/// Construct via [`WayfinderConfig::default`] and override individual
/// fields, or layer environment variables with [`WayfinderConfig::from_env`]
/// (this is the ambient config layer — it is not the file-loading CLI front
/// end, which is an external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WayfinderConfig {
    /// Gateway registry ranking key.
    #[serde(default)]
    pub ranking_key: RankingKey,

    /// Max gateways returned by a provider after ranking/truncation.
    #[serde(default = "default_gateway_limit")]
    pub gateway_limit: usize,

    /// TTL (seconds) for the in-memory / persistent gateway list cache.
    #[serde(default = "default_gateways_cache_ttl_secs")]
    pub gateways_cache_ttl_secs: u64,

    /// Bounded concurrency for gateway probes (FastestPing fan-out).
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,

    /// Per-probe HEAD timeout (milliseconds).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Ping-wrapper retry budget.
    #[serde(default = "default_ping_retries")]
    pub ping_retries: u32,

    /// Overall request timeout (milliseconds).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Strict verification: failures error the delivered stream.
    #[serde(default)]
    pub strict_verification: bool,

    /// Bounded concurrency for manifest resource verification fan-out.
    #[serde(default = "default_manifest_concurrency")]
    pub manifest_concurrency: usize,

    /// Manifest recursion depth bound.
    #[serde(default = "default_manifest_max_depth")]
    pub manifest_max_depth: u32,

    /// Manifest verification cache entry TTL (seconds).
    #[serde(default = "default_manifest_cache_ttl_secs")]
    pub manifest_cache_ttl_secs: u64,

    /// Captured-bytes cap per manifest cache entry (bytes).
    #[serde(default = "default_manifest_capture_cap_bytes")]
    pub manifest_capture_cap_bytes: u64,
}

fn default_gateway_limit() -> usize {
    1000
}
fn default_gateways_cache_ttl_secs() -> u64 {
    3600
}
fn default_probe_concurrency() -> usize {
    50
}
fn default_probe_timeout_ms() -> u64 {
    500
}
fn default_ping_retries() -> u32 {
    5
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_manifest_concurrency() -> usize {
    10
}
fn default_manifest_max_depth() -> u32 {
    5
}
fn default_manifest_cache_ttl_secs() -> u64 {
    3600
}
fn default_manifest_capture_cap_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for WayfinderConfig {
    fn default() -> Self {
        Self {
            ranking_key: RankingKey::default(),
            gateway_limit: default_gateway_limit(),
            gateways_cache_ttl_secs: default_gateways_cache_ttl_secs(),
            probe_concurrency: default_probe_concurrency(),
            probe_timeout_ms: default_probe_timeout_ms(),
            ping_retries: default_ping_retries(),
            request_timeout_ms: default_request_timeout_ms(),
            strict_verification: false,
            manifest_concurrency: default_manifest_concurrency(),
            manifest_max_depth: default_manifest_max_depth(),
            manifest_cache_ttl_secs: default_manifest_cache_ttl_secs(),
            manifest_capture_cap_bytes: default_manifest_capture_cap_bytes(),
        }
    }
}

impl WayfinderConfig {
    /// Layer `WAYFINDER_*` environment variables over the code defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let figment = Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Env::prefixed("WAYFINDER_"));
        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = WayfinderConfig::default();
        assert_eq!(cfg.gateway_limit, 1000);
        assert_eq!(cfg.probe_concurrency, 50);
        assert_eq!(cfg.probe_timeout_ms, 500);
        assert_eq!(cfg.ping_retries, 5);
        assert_eq!(cfg.manifest_concurrency, 10);
        assert_eq!(cfg.manifest_max_depth, 5);
        assert_eq!(cfg.manifest_cache_ttl_secs, 3600);
        assert_eq!(cfg.manifest_capture_cap_bytes, 10 * 1024 * 1024);
        assert!(!cfg.strict_verification);
    }

    #[test]
    fn from_env_overrides_defaults() {
        unsafe {
            std::env::set_var("WAYFINDER_STRICT_VERIFICATION", "true");
            std::env::set_var("WAYFINDER_PROBE_TIMEOUT_MS", "750");
        }
        let cfg = WayfinderConfig::from_env().unwrap();
        assert!(cfg.strict_verification);
        assert_eq!(cfg.probe_timeout_ms, 750);
        unsafe {
            std::env::remove_var("WAYFINDER_STRICT_VERIFICATION");
            std::env::remove_var("WAYFINDER_PROBE_TIMEOUT_MS");
        }
    }
}
