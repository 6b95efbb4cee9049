use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde_json::json;
use tokio::task::JoinHandle;

use wayfinder_core::{
    Emitter, Gateway, GatewaysProvider, RetrievalRequest, RoutingStrategy, SelectGatewayInput, Topic, Uri,
    VerificationResult, VerificationStrategy, VerifyInput, WayfinderConfig, WayfinderError, DataRetrievalStrategy,
};
use wayfinder_gateways::StaticGatewaysProvider;
use wayfinder_manifest::{looks_like_manifest, Manifest, ManifestVerificationCache, ManifestVerificationStrategy};
use wayfinder_observability::MetricsCollector;
use wayfinder_retrieval::ContiguousDataRetrieval;
use wayfinder_routing::FastestPing;
use wayfinder_verify::{tee, ByteStream, RemoteVerification};

use crate::response::{ManifestResponse, Response, ResolveUrlInput};

/// Per-request overrides. `headers` are forwarded to the gateway as-is;
/// `strict`, when set, overrides the client's configured
/// `strict_verification` default for this one call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HashMap<String, String>,
    pub strict: Option<bool>,
}

/// Entry point for the routing and verification pipeline: parses an `ar://`
/// address, selects a gateway, streams the payload back to the caller, and
/// verifies the bytes against the identifier it was asked for — all running
/// concurrently rather than as three sequential stages.
pub struct WayfinderClient {
    http_client: reqwest::Client,
    gateways: Arc<dyn GatewaysProvider>,
    routing: Arc<dyn RoutingStrategy>,
    retrieval: Arc<dyn DataRetrievalStrategy>,
    verification: Arc<dyn VerificationStrategy>,
    manifest_cache: Arc<ManifestVerificationCache>,
    emitter: Emitter,
    config: WayfinderConfig,
    metrics: Arc<MetricsCollector>,
}

impl WayfinderClient {
    pub fn builder() -> WayfinderClientBuilder {
        WayfinderClientBuilder::default()
    }

    /// The metrics collector backing this client's routing/verification
    /// counters and histograms, for exposing on a scrape endpoint.
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Routes and retrieves `uri`, verifying the delivered bytes against its
    /// txId concurrently with delivery. ArNS-name addresses have no
    /// independently-checkable txId and are routed without verification.
    pub async fn request(&self, uri_str: &str, opts: RequestOptions) -> Result<Response, WayfinderError> {
        if !Uri::is_ar_uri(uri_str) {
            self.emitter.emit(Topic::RoutingSkipped, json!({"uri": uri_str}));
            return self.raw_fetch(uri_str, opts).await;
        }
        let uri = Uri::parse(uri_str)?;
        let response = self.route_and_retrieve(&uri, &opts).await?;

        let Some(tx_id) = uri.tx_id.clone() else {
            self.emitter
                .emit(Topic::VerificationSkipped, json!({"reason": "no txId to verify", "subdomain": uri.subdomain}));
            return Ok(response);
        };

        let strict = opts.strict.unwrap_or(self.config.strict_verification);
        let Response { status, headers, body, gateway } = response;
        let mut branches = tee(body, 2);
        let verify_branch = branches.pop().unwrap();
        let client_branch = branches.pop().unwrap();

        let verify_input = VerifyInput { tx_id, headers: headers.clone() };
        let handle = spawn_verification(
            self.verification.clone(),
            verify_branch,
            verify_input,
            self.emitter.clone(),
            self.metrics.clone(),
        );
        let body = gate_client_stream(client_branch, handle, strict);

        Ok(Response { status, headers, body, gateway })
    }

    /// Resolves an `ar://` identifier (or any already-supported alias) to the
    /// concrete gateway URL it would be fetched from, without retrieving
    /// anything. Non-`ar://` input passes through unchanged.
    pub async fn resolve_url(&self, input: ResolveUrlInput) -> Result<String, WayfinderError> {
        let raw = input
            .original_url
            .or(input.wayfinder_url)
            .or_else(|| input.tx_id.map(|t| format!("ar://{t}")))
            .or_else(|| input.arns_name.map(|n| format!("ar://{n}")))
            .ok_or_else(|| {
                WayfinderError::InvalidUri(
                    "resolve_url requires one of original_url/wayfinder_url/tx_id/arns_name".into(),
                )
            })?;

        if !Uri::is_ar_uri(&raw) {
            self.emitter.emit(Topic::RoutingSkipped, json!({"uri": raw}));
            return Ok(raw);
        }

        let uri = Uri::parse(&raw)?;
        let gateways = self.gateways.get_gateways().await?;
        let gateway = self
            .routing
            .select_gateway(SelectGatewayInput {
                gateways: Some(gateways),
                path: Some(uri.path.clone()),
                subdomain: Some(uri.subdomain.clone()),
            })
            .await?;

        let ident = uri.tx_id.clone().or_else(|| uri.arns_name.clone()).unwrap_or_default();
        let full_path = if uri.path.is_empty() { ident } else { format!("{ident}/{}", uri.path) };
        Ok(gateway.request_url(Some(&uri.subdomain), &full_path))
    }

    /// Routes and retrieves `uri`, then — if the resource is a path manifest
    /// — recursively verifies every resource it references before returning.
    /// Unlike [`WayfinderClient::request`], this resolves fully before
    /// returning: building the combined manifest/verification-results bundle
    /// requires the whole body anyway.
    pub async fn request_with_manifest(
        &self,
        uri_str: &str,
        opts: RequestOptions,
    ) -> Result<ManifestResponse, WayfinderError> {
        if !Uri::is_ar_uri(uri_str) {
            self.emitter.emit(Topic::RoutingSkipped, json!({"uri": uri_str}));
            let response = self.raw_fetch(uri_str, opts).await?;
            return Ok(ManifestResponse {
                response,
                manifest: None,
                verification_results: HashMap::new(),
                all_verified: true,
            });
        }
        let uri = Uri::parse(uri_str)?;
        let response = self.route_and_retrieve(&uri, &opts).await?;

        let Some(tx_id) = uri.tx_id.clone() else {
            return Ok(ManifestResponse {
                response,
                manifest: None,
                verification_results: HashMap::new(),
                all_verified: true,
            });
        };

        let strict = opts.strict.unwrap_or(self.config.strict_verification);
        let Response { status, headers, body, gateway } = response;
        let mut branches = tee(body, 2);
        let verify_branch = branches.pop().unwrap();
        let client_branch = branches.pop().unwrap();

        let manifest_strategy = ManifestVerificationStrategy::new(self.verification.clone(), self.http_client.clone())?
            .with_concurrency(self.config.manifest_concurrency)
            .with_max_depth(self.config.manifest_max_depth)
            .with_capture_cap_bytes(self.config.manifest_capture_cap_bytes)
            .with_strict(strict)
            .with_cache(self.manifest_cache.clone())
            .with_emitter(self.emitter.clone());

        self.emitter.emit(Topic::VerificationStarted, json!({"txId": tx_id}));
        let verify_input = VerifyInput { tx_id: tx_id.clone(), headers: headers.clone() };
        let started = std::time::Instant::now();
        let outcome = manifest_strategy.verify_data(verify_branch, verify_input).await;
        let elapsed = started.elapsed().as_secs_f64();

        let (root_result, manifest) = match outcome {
            Ok(result) => {
                let metric_outcome = if result.verified { "verified" } else { "failed" };
                self.metrics.record_verification("manifest", metric_outcome, elapsed);
                self.emitter
                    .emit(Topic::VerificationSucceeded, json!({"txId": tx_id, "verified": result.verified}));
                let manifest = if looks_like_manifest(result.content_type.as_deref()) {
                    result.content.as_deref().and_then(|bytes| Manifest::parse(bytes).ok())
                } else {
                    None
                };
                (result, manifest)
            }
            Err(e) if strict => {
                self.metrics.record_verification("manifest", "failed", elapsed);
                self.emitter.emit(Topic::VerificationFailed, json!({"txId": tx_id, "error": e.to_string()}));
                return Err(e);
            }
            Err(e) => {
                self.metrics.record_verification("manifest", "failed", elapsed);
                self.emitter.emit(Topic::VerificationFailed, json!({"txId": tx_id, "error": e.to_string()}));
                (failed_result(&tx_id, &e), None)
            }
        };

        let mut verification_results = HashMap::new();
        let mut all_verified = root_result.verified;
        if let Some(manifest) = &manifest {
            if let Ok(referenced) = manifest.referenced_tx_ids() {
                for referenced_tx_id in referenced {
                    match self.manifest_cache.get(&referenced_tx_id) {
                        Some(r) => {
                            all_verified = all_verified && r.verified;
                            verification_results.insert(referenced_tx_id, r);
                        }
                        None => all_verified = false,
                    }
                }
            }
        }
        verification_results.insert(tx_id, root_result);

        Ok(ManifestResponse {
            response: Response { status, headers, body: client_branch, gateway },
            manifest,
            verification_results,
            all_verified,
        })
    }

    /// Non-`ar://` inputs bypass routing and verification entirely: fetched
    /// directly from whatever host the caller already named, with no gateway
    /// selection and nothing to check the bytes against.
    async fn raw_fetch(&self, uri_str: &str, opts: RequestOptions) -> Result<Response, WayfinderError> {
        let gateway = Gateway::parse(uri_str)
            .map_err(|e| WayfinderError::InvalidUri(format!("not a fetchable url: {uri_str} ({e})")))?;
        let retrieved = ContiguousDataRetrieval::new(self.http_client.clone())
            .get_data(RetrievalRequest {
                gateway: gateway.clone(),
                request_url: uri_str.to_string(),
                headers: opts.headers,
            })
            .await?;
        Ok(Response {
            status: retrieved.status,
            headers: retrieved.headers,
            body: retrieved.body,
            gateway,
        })
    }

    async fn route_and_retrieve(&self, uri: &Uri, opts: &RequestOptions) -> Result<Response, WayfinderError> {
        self.emitter.emit(Topic::RoutingStarted, json!({"subdomain": uri.subdomain}));
        let gateways = self.gateways.get_gateways().await?;
        let started = std::time::Instant::now();
        let gateway = match self
            .routing
            .select_gateway(SelectGatewayInput {
                gateways: Some(gateways),
                path: Some(uri.path.clone()),
                subdomain: Some(uri.subdomain.clone()),
            })
            .await
        {
            Ok(gateway) => {
                self.metrics.record_routing("routing", "succeeded", started.elapsed().as_secs_f64());
                self.emitter.emit(Topic::RoutingSucceeded, json!({"gateway": gateway.as_str()}));
                gateway
            }
            Err(e) => {
                self.metrics.record_routing("routing", "failed", started.elapsed().as_secs_f64());
                self.emitter.emit(Topic::RoutingFailed, json!({"error": e.to_string()}));
                return Err(e);
            }
        };

        let ident = uri.tx_id.clone().or_else(|| uri.arns_name.clone()).unwrap_or_default();
        let full_path = if uri.path.is_empty() { ident.clone() } else { format!("{ident}/{}", uri.path) };
        let request_url = gateway.request_url(Some(&uri.subdomain), &full_path);

        let retrieved = self
            .retrieval
            .get_data(RetrievalRequest {
                gateway: gateway.clone(),
                request_url,
                headers: opts.headers.clone(),
            })
            .await?;

        if let Some(len) = retrieved.headers.get("content-length").and_then(|v| v.parse::<u64>().ok()) {
            self.metrics.record_retrieval_bytes(gateway.as_str(), len);
        }

        Ok(Response {
            status: retrieved.status,
            headers: retrieved.headers,
            body: retrieved.body,
            gateway,
        })
    }
}

fn failed_result(tx_id: &str, error: &WayfinderError) -> VerificationResult {
    VerificationResult {
        tx_id: tx_id.to_string(),
        verified: false,
        hash: None,
        error: Some(error.to_string()),
        timestamp: chrono::Utc::now(),
        content: None,
        content_type: None,
        headers: HashMap::new(),
    }
}

fn spawn_verification(
    verification: Arc<dyn VerificationStrategy>,
    verify_branch: ByteStream,
    verify_input: VerifyInput,
    emitter: Emitter,
    metrics: Arc<MetricsCollector>,
) -> JoinHandle<Result<VerificationResult, WayfinderError>> {
    let tx_id = verify_input.tx_id.clone();
    let strategy_name = verification.name();
    tokio::spawn(async move {
        emitter.emit(Topic::VerificationStarted, json!({"txId": tx_id}));
        let started = std::time::Instant::now();
        let result = verification.verify_data(verify_branch, verify_input).await;
        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(r) => {
                let outcome = if r.verified { "verified" } else { "failed" };
                metrics.record_verification(strategy_name, outcome, elapsed);
                emitter.emit(Topic::VerificationSucceeded, json!({"txId": tx_id, "verified": r.verified}));
            }
            Err(e) => {
                metrics.record_verification(strategy_name, "failed", elapsed);
                emitter.emit(Topic::VerificationFailed, json!({"txId": tx_id, "error": e.to_string()}));
            }
        }
        result
    })
}

enum GateState {
    Streaming(ByteStream, JoinHandle<Result<VerificationResult, WayfinderError>>),
    Done,
}

/// In strict mode, appends a final error item to the client-facing branch
/// once verification completes, if it failed. Non-strict callers get the
/// unmodified branch — verification still runs and still emits its events,
/// just without blocking (or being able to fail) delivery.
fn gate_client_stream(
    client_branch: ByteStream,
    handle: JoinHandle<Result<VerificationResult, WayfinderError>>,
    strict: bool,
) -> ByteStream {
    if !strict {
        return client_branch;
    }

    Box::pin(stream::unfold(GateState::Streaming(client_branch, handle), |state| async move {
        match state {
            GateState::Streaming(mut branch, handle) => match branch.next().await {
                Some(item) => Some((item, GateState::Streaming(branch, handle))),
                None => match handle.await {
                    Ok(Ok(_)) => None,
                    Ok(Err(e)) => Some((Err(e), GateState::Done)),
                    Err(_join_error) => Some((Err(WayfinderError::Cancelled), GateState::Done)),
                },
            },
            GateState::Done => None,
        }
    }))
}

/// Builder for [`WayfinderClient`]. Gateways are the only required input;
/// everything else falls back to a sensible default with reasonable
/// concurrency and timeout settings.
pub struct WayfinderClientBuilder {
    http_client: Option<reqwest::Client>,
    gateways: Option<Arc<dyn GatewaysProvider>>,
    routing: Option<Arc<dyn RoutingStrategy>>,
    retrieval: Option<Arc<dyn DataRetrievalStrategy>>,
    verification: Option<Arc<dyn VerificationStrategy>>,
    emitter: Option<Emitter>,
    config: WayfinderConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Default for WayfinderClientBuilder {
    fn default() -> Self {
        Self {
            http_client: None,
            gateways: None,
            routing: None,
            retrieval: None,
            verification: None,
            emitter: None,
            config: WayfinderConfig::default(),
            metrics: None,
        }
    }
}

impl WayfinderClientBuilder {
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_gateways(mut self, provider: Arc<dyn GatewaysProvider>) -> Self {
        self.gateways = Some(provider);
        self
    }

    /// Convenience over `with_gateways` for a fixed, never-refreshed list.
    /// An empty list is accepted here; it surfaces as `NoGateways` the first
    /// time the client actually tries to route a request.
    pub fn with_static_gateways(self, gateways: Vec<Gateway>) -> Self {
        self.with_gateways(Arc::new(StaticGatewaysProvider::new(gateways)))
    }

    pub fn with_routing(mut self, routing: Arc<dyn RoutingStrategy>) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn DataRetrievalStrategy>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_verification(mut self, verification: Arc<dyn VerificationStrategy>) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn with_emitter(mut self, emitter: Emitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_config(mut self, config: WayfinderConfig) -> Self {
        self.config = config;
        self
    }

    /// Supplies a metrics collector shared with other components (e.g. a
    /// `/metrics` scrape endpoint exposing the same registry). Defaults to a
    /// fresh, privately-registered collector.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<WayfinderClient, WayfinderError> {
        let http_client = self.http_client.unwrap_or_default();
        let gateways = self.gateways.ok_or_else(|| {
            WayfinderError::Internal("no gateways provider configured (call with_gateways or with_static_gateways)".into())
        })?;

        let routing = self.routing.unwrap_or_else(|| {
            Arc::new(
                FastestPing::new(http_client.clone())
                    .with_provider(gateways.clone())
                    .with_concurrency(self.config.probe_concurrency)
                    .with_timeout(Duration::from_millis(self.config.probe_timeout_ms)),
            )
        });

        let retrieval = self
            .retrieval
            .unwrap_or_else(|| Arc::new(ContiguousDataRetrieval::new(http_client.clone())));

        // Trusts whichever gateway served the bytes, with no independent
        // cross-check. Callers who want hash/data-root/signature checking
        // against trusted gateways configure `with_verification` explicitly.
        let verification = self.verification.unwrap_or_else(|| Arc::new(RemoteVerification::new()));

        let emitter = self.emitter.unwrap_or_else(|| Emitter::global().child());
        let metrics = self
            .metrics
            .map(Ok)
            .unwrap_or_else(|| MetricsCollector::new().map(Arc::new))
            .map_err(|e| WayfinderError::Internal(format!("failed to build metrics collector: {e}")))?;

        Ok(WayfinderClient {
            http_client,
            gateways,
            routing,
            retrieval,
            verification,
            manifest_cache: Arc::new(ManifestVerificationCache::new(Duration::from_secs(
                self.config.manifest_cache_ttl_secs,
            ))),
            emitter,
            config: self.config,
            metrics,
        })
    }
}
