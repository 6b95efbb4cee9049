use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use wayfinder_core::{sandbox_subdomain, Gateway, VerificationResult, VerificationStrategy, VerifyInput, WayfinderError};

use crate::tee::ByteStream;

const DIGEST_HEADER: &str = "x-ar-io-digest";

/// Consumes the stream, computing SHA-256 incrementally and encoding it as
/// base64url (no padding), then cross-checks the result against a digest
/// fetched concurrently from the configured trusted gateways.
///
/// Trusted-digest lookup is HEAD -> GET -> HEAD against
/// `scheme://<sandbox>.<gateway-host>/<txId>`: the GET exists purely to warm
/// a gateway's cache when the first HEAD doesn't carry the digest header.
pub struct HashVerification {
    client: reqwest::Client,
    trusted_gateways: Vec<Gateway>,
}

impl HashVerification {
    pub fn new(client: reqwest::Client, trusted_gateways: Vec<Gateway>) -> Self {
        Self {
            client,
            trusted_gateways,
        }
    }

    async fn fetch_one_digest(&self, gateway: &Gateway, sandbox: &str, tx_id: &str) -> Option<String> {
        let url = gateway.request_url(Some(sandbox), tx_id);

        if let Ok(resp) = self.client.head(&url).send().await {
            if let Some(digest) = extract_digest(&resp) {
                return Some(digest);
            }
        }

        // Warm the gateway's cache; the digest is commonly only computed
        // (and cached) once the gateway has actually served the bytes.
        let _ = self.client.get(&url).send().await;

        if let Ok(resp) = self.client.head(&url).send().await {
            if let Some(digest) = extract_digest(&resp) {
                return Some(digest);
            }
        }

        None
    }

    async fn fetch_trusted_digest(&self, tx_id: &str) -> Result<String, WayfinderError> {
        let sandbox = sandbox_subdomain(tx_id)?;
        let responses = futures_util::future::join_all(
            self.trusted_gateways
                .iter()
                .map(|gw| self.fetch_one_digest(gw, &sandbox, tx_id)),
        )
        .await;

        let mut trusted: Option<String> = None;
        for digest in responses.into_iter().flatten() {
            match &trusted {
                None => trusted = Some(digest),
                Some(existing) if *existing != digest => {
                    tracing::warn!(tx_id = %tx_id, existing = %existing, digest = %digest, "trusted gateways disagree on digest");
                    return Err(WayfinderError::DigestMismatch {
                        tx_id: tx_id.to_string(),
                    });
                }
                _ => {}
            }
        }

        trusted.ok_or_else(|| {
            WayfinderError::verification_failed("hash", "no trusted gateway returned a digest")
        })
    }

    async fn compute_hash(mut data: ByteStream) -> Result<String, WayfinderError> {
        let mut hasher = Sha256::new();
        while let Some(chunk) = data.next().await {
            hasher.update(chunk?);
        }
        Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }
}

fn extract_digest(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(DIGEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl VerificationStrategy for HashVerification {
    async fn verify_data(
        &self,
        data: ByteStream,
        input: VerifyInput,
    ) -> Result<VerificationResult, WayfinderError> {
        let tx_id = input.tx_id.clone();
        let (trusted_digest, computed) =
            tokio::join!(self.fetch_trusted_digest(&tx_id), Self::compute_hash(data));
        let computed = computed?;
        let trusted_digest = trusted_digest?;

        if computed != trusted_digest {
            return Err(WayfinderError::DigestMismatch { tx_id });
        }

        Ok(VerificationResult {
            tx_id,
            verified: true,
            hash: Some(computed),
            error: None,
            timestamp: chrono::Utc::now(),
            content: None,
            content_type: input.headers.get("content-type").cloned(),
            headers: input.headers,
        })
    }

    fn trusted_gateways(&self) -> &[Gateway] {
        &self.trusted_gateways
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}
