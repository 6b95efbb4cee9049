use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Prometheus metrics for the routing and verification pipelines. Scoped to
/// what the pipeline itself produces — the OTLP trace exporter a full
/// observability stack would add is out of scope here.
pub struct MetricsCollector {
    registry: Registry,

    /// Routing decisions by strategy and outcome (`succeeded`/`failed`/`skipped`).
    pub routing_decisions_total: IntCounterVec,

    /// Wall-clock time spent selecting a gateway, by strategy.
    pub routing_duration: HistogramVec,

    /// Verification outcomes by strategy name and result (`verified`/`failed`).
    pub verification_total: IntCounterVec,

    /// Wall-clock time spent verifying one identifier's bytes, by strategy.
    pub verification_duration: HistogramVec,

    /// Bytes retrieved per gateway, for bandwidth accounting.
    pub retrieval_bytes_total: IntCounterVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let routing_decisions_total = IntCounterVec::new(
            Opts::new("wayfinder_routing_decisions_total", "Total routing decisions").namespace("wayfinder"),
            &["strategy", "outcome"],
        )?;

        let routing_duration = HistogramVec::new(
            HistogramOpts::new("wayfinder_routing_duration_seconds", "Gateway selection latency")
                .namespace("wayfinder")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["strategy"],
        )?;

        let verification_total = IntCounterVec::new(
            Opts::new("wayfinder_verification_total", "Total verification outcomes").namespace("wayfinder"),
            &["strategy", "outcome"],
        )?;

        let verification_duration = HistogramVec::new(
            HistogramOpts::new("wayfinder_verification_duration_seconds", "Verification latency")
                .namespace("wayfinder")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
            &["strategy"],
        )?;

        let retrieval_bytes_total = IntCounterVec::new(
            Opts::new("wayfinder_retrieval_bytes_total", "Total bytes retrieved").namespace("wayfinder"),
            &["gateway"],
        )?;

        registry.register(Box::new(routing_decisions_total.clone()))?;
        registry.register(Box::new(routing_duration.clone()))?;
        registry.register(Box::new(verification_total.clone()))?;
        registry.register(Box::new(verification_duration.clone()))?;
        registry.register(Box::new(retrieval_bytes_total.clone()))?;

        Ok(Self {
            registry,
            routing_decisions_total,
            routing_duration,
            verification_total,
            verification_duration,
            retrieval_bytes_total,
        })
    }

    pub fn record_routing(&self, strategy: &str, outcome: &str, duration_secs: f64) {
        self.routing_decisions_total.with_label_values(&[strategy, outcome]).inc();
        self.routing_duration.with_label_values(&[strategy]).observe(duration_secs);
    }

    pub fn record_verification(&self, strategy: &str, outcome: &str, duration_secs: f64) {
        self.verification_total.with_label_values(&[strategy, outcome]).inc();
        self.verification_duration.with_label_values(&[strategy]).observe(duration_secs);
    }

    pub fn record_retrieval_bytes(&self, gateway: &str, bytes: u64) {
        self.retrieval_bytes_total.with_label_values(&[gateway]).inc_by(bytes);
    }

    /// Prometheus text exposition, for a scrape endpoint.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metrics = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metrics, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("failed to construct wayfinder metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_routing_and_exposes_counter() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_routing("fastest-ping", "succeeded", 0.042);
        let text = metrics.gather_text();
        assert!(text.contains("wayfinder_routing_decisions_total"));
        assert!(text.contains("fastest-ping"));
    }

    #[test]
    fn records_verification_outcome() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_verification("hash", "verified", 0.01);
        let text = metrics.gather_text();
        assert!(text.contains("wayfinder_verification_total"));
    }

    #[test]
    fn records_retrieval_bytes() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_retrieval_bytes("https://arweave.net", 2048);
        let text = metrics.gather_text();
        assert!(text.contains("wayfinder_retrieval_bytes_total"));
    }
}
