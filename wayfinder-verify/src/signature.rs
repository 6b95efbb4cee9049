use async_trait::async_trait;
use futures_util::StreamExt;
use wayfinder_core::{sandbox_subdomain, Gateway, VerificationResult, VerificationStrategy, VerifyInput, WayfinderError};

use crate::tee::ByteStream;

const SIGNATURE_HEADER: &str = "x-ar-io-signature";

/// Cross-checks the data item/transaction signature attested by each
/// trusted gateway. Unlike [`crate::hash::HashVerification`] this strategy
/// does not recompute anything locally from the stream bytes — it holds the
/// same trusted-gateway abstraction and simply fails on disagreement or on
/// no gateway responding, exactly as the hash strategy does for digests.
pub struct SignatureVerification {
    client: reqwest::Client,
    trusted_gateways: Vec<Gateway>,
}

impl SignatureVerification {
    pub fn new(client: reqwest::Client, trusted_gateways: Vec<Gateway>) -> Self {
        Self {
            client,
            trusted_gateways,
        }
    }

    async fn fetch_signature(&self, gateway: &Gateway, sandbox: &str, tx_id: &str) -> Option<String> {
        let url = gateway.request_url(Some(sandbox), tx_id);
        let resp = self.client.head(&url).send().await.ok()?;
        resp.headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn fetch_trusted_signature(&self, tx_id: &str) -> Result<String, WayfinderError> {
        let sandbox = sandbox_subdomain(tx_id)?;
        let responses = futures_util::future::join_all(
            self.trusted_gateways
                .iter()
                .map(|gw| self.fetch_signature(gw, &sandbox, tx_id)),
        )
        .await;

        let mut trusted: Option<String> = None;
        for sig in responses.into_iter().flatten() {
            match &trusted {
                None => trusted = Some(sig),
                Some(existing) if *existing != sig => {
                    return Err(WayfinderError::verification_failed(
                        "signature",
                        format!("trusted gateways disagree on the signature for {tx_id}"),
                    ));
                }
                _ => {}
            }
        }

        trusted.ok_or_else(|| {
            WayfinderError::verification_failed("signature", "no trusted gateway returned a signature")
        })
    }
}

#[async_trait]
impl VerificationStrategy for SignatureVerification {
    async fn verify_data(
        &self,
        mut data: ByteStream,
        input: VerifyInput,
    ) -> Result<VerificationResult, WayfinderError> {
        let tx_id = input.tx_id.clone();
        let signature_fut = self.fetch_trusted_signature(&tx_id);
        let drain_fut = async {
            while let Some(chunk) = data.next().await {
                chunk?;
            }
            Ok::<(), WayfinderError>(())
        };
        let (signature, drained) = tokio::join!(signature_fut, drain_fut);
        drained?;
        let signature = signature?;

        Ok(VerificationResult {
            tx_id,
            verified: true,
            hash: Some(signature),
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
        "signature"
    }
}
