use async_trait::async_trait;
use futures_util::StreamExt;
use wayfinder_core::{Gateway, VerificationResult, VerificationStrategy, VerifyInput, WayfinderError};

use crate::tee::ByteStream;

const VERIFIED_HEADER: &str = "x-ar-io-verified";

/// Trusts the origin gateway's own attestation: a response carrying
/// `X-AR-IO-Verified: true` (header name case-insensitive, value exactly
/// `"true"` case-sensitive) is considered verified. Holds no trusted
/// gateways of its own, which is exactly why `ManifestVerification` rejects
/// it at construction — it has no way to independently fetch and check
/// nested resources.
#[derive(Default)]
pub struct RemoteVerification;

impl RemoteVerification {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VerificationStrategy for RemoteVerification {
    async fn verify_data(
        &self,
        mut data: ByteStream,
        input: VerifyInput,
    ) -> Result<VerificationResult, WayfinderError> {
        // Header names from the retrieval layer are already lowercase
        // (reqwest/http normalize `HeaderName` to lowercase ASCII), so a
        // literal lowercase lookup is case-insensitive by construction.
        let attested = input.headers.get(VERIFIED_HEADER).map(String::as_str) == Some("true");

        // Still drain the stream so the client branch is free to complete;
        // this strategy never buffers content.
        while let Some(chunk) = data.next().await {
            chunk?;
        }

        if !attested {
            return Err(WayfinderError::verification_failed(
                "remote",
                "origin did not attest X-AR-IO-Verified: true",
            ));
        }

        Ok(VerificationResult {
            tx_id: input.tx_id,
            verified: true,
            hash: None,
            error: None,
            timestamp: chrono::Utc::now(),
            content: None,
            content_type: input.headers.get("content-type").cloned(),
            headers: input.headers,
        })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;

    fn empty_stream() -> ByteStream {
        Box::pin(futures_util::stream::iter(Vec::<Result<Bytes, WayfinderError>>::new()))
    }

    fn headers_with(value: &str) -> HashMap<String, String> {
        let mut h = HashMap::new();
        h.insert(VERIFIED_HEADER.to_string(), value.to_string());
        h
    }

    #[tokio::test]
    async fn header_true_verifies() {
        let strategy = RemoteVerification::new();
        let result = strategy
            .verify_data(
                empty_stream(),
                VerifyInput {
                    tx_id: "tx".into(),
                    headers: headers_with("true"),
                },
            )
            .await
            .unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn wrong_case_value_fails() {
        let strategy = RemoteVerification::new();
        let result = strategy
            .verify_data(
                empty_stream(),
                VerifyInput {
                    tx_id: "tx".into(),
                    headers: headers_with("True"),
                },
            )
            .await;
        assert!(matches!(result, Err(WayfinderError::VerificationFailed { .. })));
    }

    #[tokio::test]
    async fn missing_header_fails() {
        let strategy = RemoteVerification::new();
        let result = strategy
            .verify_data(
                empty_stream(),
                VerifyInput {
                    tx_id: "tx".into(),
                    headers: HashMap::new(),
                },
            )
            .await;
        assert!(matches!(result, Err(WayfinderError::VerificationFailed { .. })));
    }

    #[test]
    fn holds_no_trusted_gateways() {
        let strategy = RemoteVerification::new();
        assert!(<RemoteVerification as VerificationStrategy>::trusted_gateways(&strategy).is_empty());
        let _: &[Gateway] = strategy.trusted_gateways();
    }
}
