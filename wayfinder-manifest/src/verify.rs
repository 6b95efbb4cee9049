use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashSet;
use futures_util::future::BoxFuture;
use futures_util::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;
use wayfinder_core::{
    sandbox_subdomain, Emitter, Gateway, Limiter, Topic, VerificationResult, VerificationStrategy, VerifyInput,
    WayfinderError,
};
use wayfinder_verify::{tee, ByteStream};

use crate::cache::ManifestVerificationCache;
use crate::manifest::{looks_like_manifest, Manifest};

const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_MAX_DEPTH: u32 = 5;
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CAPTURE_CAP_BYTES: u64 = 10 * 1024 * 1024;

/// Wraps a base [`VerificationStrategy`] and recursively verifies the
/// transitive resource graph a manifest describes. Constructing one with a
/// base that has no trusted gateways, or with `RemoteVerification` (which
/// cannot fetch nested resources at all), fails immediately.
pub struct ManifestVerificationStrategy {
    base: Arc<dyn VerificationStrategy>,
    client: reqwest::Client,
    concurrency: usize,
    max_depth: u32,
    capture_cap_bytes: u64,
    strict: bool,
    cache: Arc<ManifestVerificationCache>,
    emitter: Emitter,
}

impl ManifestVerificationStrategy {
    pub fn new(base: Arc<dyn VerificationStrategy>, client: reqwest::Client) -> Result<Self, WayfinderError> {
        if base.name() == "remote" {
            return Err(WayfinderError::Internal(
                "ManifestVerification cannot wrap RemoteVerification: it has no way to fetch nested resources"
                    .into(),
            ));
        }
        if base.trusted_gateways().is_empty() {
            return Err(WayfinderError::Internal(
                "ManifestVerification requires a base strategy with at least one trusted gateway".into(),
            ));
        }
        Ok(Self {
            base,
            client,
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
            capture_cap_bytes: DEFAULT_CAPTURE_CAP_BYTES,
            strict: false,
            cache: Arc::new(ManifestVerificationCache::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))),
            emitter: Emitter::new(),
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_capture_cap_bytes(mut self, cap: u64) -> Self {
        self.capture_cap_bytes = cap;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ManifestVerificationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_emitter(mut self, emitter: Emitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn cache(&self) -> &Arc<ManifestVerificationCache> {
        &self.cache
    }

    fn emit_progress(&self, event: &str, tx_id: &str, extra: serde_json::Value) {
        let mut payload = serde_json::json!({ "event": event, "txId": tx_id });
        if let (Some(obj), Some(extra_obj)) = (payload.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                obj.insert(k.clone(), v.clone());
            }
        }
        self.emitter.emit(Topic::ManifestProgress, payload);
    }

    async fn fetch_from_trusted(&self, tx_id: &str) -> Result<(Vec<u8>, Option<String>), WayfinderError> {
        let sandbox = sandbox_subdomain(tx_id)?;
        for gateway in self.base.trusted_gateways() {
            let url = gateway.request_url(Some(&sandbox), tx_id);
            let Ok(resp) = self.client.get(&url).send().await else {
                continue;
            };
            if !resp.status().is_success() {
                continue;
            }
            let content_type = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let Ok(bytes) = resp.bytes().await {
                return Ok((bytes.to_vec(), content_type));
            }
        }
        Err(WayfinderError::RetrievalFailed(format!(
            "no trusted gateway served resource {tx_id}"
        )))
    }

    fn verify_resource<'a>(
        &'a self,
        tx_id: String,
        depth: u32,
        limiter: Arc<Limiter>,
        visited: Arc<DashSet<String>>,
    ) -> BoxFuture<'a, Result<(), WayfinderError>> {
        Box::pin(async move {
            if depth > self.max_depth {
                return Err(WayfinderError::MaxDepthExceeded {
                    max_depth: self.max_depth,
                });
            }
            if !visited.insert(tx_id.clone()) {
                return Ok(()); // already in flight/visited this request; cycle guard
            }
            if let Some(cached) = self.cache.get(&tx_id) {
                if cached.verified {
                    return Ok(());
                }
            }

            self.emit_progress("resource-verifying", &tx_id, serde_json::json!({ "depth": depth }));

            let permit = limiter.acquire().await.ok_or(WayfinderError::Cancelled)?;
            let fetch_result = self.fetch_from_trusted(&tx_id).await;
            drop(permit);
            let (bytes, content_type) = match fetch_result {
                Ok(pair) => pair,
                Err(e) => {
                    self.emitter.emit(
                        Topic::VerificationFailed,
                        serde_json::json!({ "txId": tx_id, "error": e.to_string() }),
                    );
                    self.cache.set(
                        tx_id.clone(),
                        VerificationResult {
                            tx_id: tx_id.clone(),
                            verified: false,
                            hash: None,
                            error: Some(e.to_string()),
                            timestamp: chrono::Utc::now(),
                            content: None,
                            content_type: None,
                            headers: HashMap::new(),
                        },
                    );
                    return if self.strict { Err(e) } else { Ok(()) };
                }
            };

            if looks_like_manifest(content_type.as_deref()) {
                self.emit_progress("nested-manifest-detected", &tx_id, serde_json::json!({}));
                let nested = Manifest::parse(&bytes)?;
                self.cache.set(tx_id.clone(), leaf_result(&tx_id, true, content_type, &bytes, self.capture_cap_bytes));
                let refs = nested.referenced_tx_ids()?;
                let results = futures_util::future::join_all(
                    refs.into_iter()
                        .map(|r| self.verify_resource(r, depth + 1, Arc::clone(&limiter), Arc::clone(&visited))),
                )
                .await;
                for result in results {
                    result?;
                }
                self.emit_progress("resource-verified", &tx_id, serde_json::json!({}));
                return Ok(());
            }

            let body: ByteStream = Box::pin(stream::once(async move { Ok::<Bytes, WayfinderError>(Bytes::from(bytes)) }));
            let mut headers = HashMap::new();
            if let Some(ct) = &content_type {
                headers.insert("content-type".to_string(), ct.clone());
            }
            match self
                .base
                .verify_data(body, VerifyInput { tx_id: tx_id.clone(), headers })
                .await
            {
                Ok(result) => {
                    self.cache.set(tx_id.clone(), result);
                    self.emit_progress("resource-verified", &tx_id, serde_json::json!({}));
                    Ok(())
                }
                Err(e) => {
                    self.emitter.emit(
                        Topic::VerificationFailed,
                        serde_json::json!({ "txId": tx_id, "error": e.to_string() }),
                    );
                    self.cache.set(
                        tx_id.clone(),
                        VerificationResult {
                            tx_id: tx_id.clone(),
                            verified: false,
                            hash: None,
                            error: Some(e.to_string()),
                            timestamp: chrono::Utc::now(),
                            content: None,
                            content_type: None,
                            headers: HashMap::new(),
                        },
                    );
                    if self.strict {
                        Err(e)
                    } else {
                        Ok(())
                    }
                }
            }
        })
    }
}

fn leaf_result(tx_id: &str, verified: bool, content_type: Option<String>, bytes: &[u8], cap: u64) -> VerificationResult {
    VerificationResult {
        tx_id: tx_id.to_string(),
        verified,
        hash: None,
        error: None,
        timestamp: chrono::Utc::now(),
        content: if (bytes.len() as u64) <= cap {
            Some(Bytes::copy_from_slice(bytes))
        } else {
            None
        },
        content_type,
        headers: HashMap::new(),
    }
}

async fn collect_all(mut stream: ByteStream) -> Result<Vec<u8>, WayfinderError> {
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

async fn collect_capped(mut stream: ByteStream, cap: u64) -> Result<Option<Bytes>, WayfinderError> {
    let mut buf = Vec::new();
    let mut over_cap = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !over_cap {
            buf.extend_from_slice(&chunk);
            if buf.len() as u64 > cap {
                over_cap = true;
                buf.clear();
                buf.shrink_to_fit();
            }
        }
    }
    Ok(if over_cap { None } else { Some(Bytes::from(buf)) })
}

#[async_trait]
impl VerificationStrategy for ManifestVerificationStrategy {
    async fn verify_data(
        &self,
        data: ByteStream,
        input: VerifyInput,
    ) -> Result<VerificationResult, WayfinderError> {
        let content_type = input.headers.get("content-type").cloned();
        if !looks_like_manifest(content_type.as_deref()) {
            return self.base.verify_data(data, input).await;
        }

        let tx_id = input.tx_id.clone();
        self.emit_progress("manifest-detected", &tx_id, serde_json::json!({}));

        let mut branches = tee(data, 3);
        let capture_branch = branches.pop().unwrap();
        let parse_branch = branches.pop().unwrap();
        let verify_branch = branches.pop().unwrap();

        let verify_fut = self.base.verify_data(
            verify_branch,
            VerifyInput {
                tx_id: tx_id.clone(),
                headers: input.headers.clone(),
            },
        );
        let parse_fut = collect_all(parse_branch);
        let capture_fut = collect_capped(capture_branch, self.capture_cap_bytes);

        let (base_result, parsed_bytes, captured) = tokio::join!(verify_fut, parse_fut, capture_fut);
        let base_result = base_result?;
        let parsed_bytes = parsed_bytes?;
        let captured = captured?;

        let manifest = Manifest::parse(&parsed_bytes)?;
        self.emit_progress("manifest-parsed", &tx_id, serde_json::json!({}));

        let referenced = manifest.referenced_tx_ids()?;
        let limiter = Arc::new(Limiter::new(self.concurrency.max(1)));
        let visited: Arc<DashSet<String>> = Arc::new(DashSet::new());
        visited.insert(tx_id.clone());

        let results = futures_util::future::join_all(
            referenced
                .iter()
                .map(|r| self.verify_resource(r.clone(), 1, Arc::clone(&limiter), Arc::clone(&visited))),
        )
        .await;

        for result in &results {
            if result.is_err() && self.strict {
                return Err(WayfinderError::Internal(format!(
                    "nested manifest resource verification failed: {}",
                    result.as_ref().unwrap_err()
                )));
            }
        }

        let all_verified = referenced
            .iter()
            .all(|tx| self.cache.get(tx).map(|r| r.verified).unwrap_or(false));

        self.emit_progress(
            "manifest-complete",
            &tx_id,
            serde_json::json!({ "allVerified": all_verified }),
        );

        Ok(VerificationResult {
            tx_id,
            verified: base_result.verified && all_verified,
            hash: base_result.hash,
            error: None,
            timestamp: chrono::Utc::now(),
            content: captured,
            content_type,
            headers: input.headers,
        })
    }

    fn trusted_gateways(&self) -> &[Gateway] {
        self.base.trusted_gateways()
    }

    fn name(&self) -> &'static str {
        "manifest"
    }
}
