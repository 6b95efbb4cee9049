use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use wayfinder_core::{DataClassifier, Gateway, VerificationResult, VerificationStrategy, VerifyInput, WayfinderError};

use crate::tee::ByteStream;

/// Upper bound on a single chunk, in bytes (256 KiB).
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;
/// Lower bound a chunk must meet, except when it is the payload's only
/// chunk (a payload smaller than `MAX_CHUNK_SIZE` is always one chunk).
pub const MIN_CHUNK_SIZE: usize = 32 * 1024;

/// Partitions `data` into chunks of at most `MAX_CHUNK_SIZE` bytes. When the
/// remainder after cutting one more full chunk would fall below
/// `MIN_CHUNK_SIZE`, the current and final chunk are split in half instead,
/// so the last two chunks both clear the minimum.
pub fn partition_chunks(data: &[u8]) -> Vec<&[u8]> {
    let mut chunks = Vec::new();
    let mut rest = data;
    while rest.len() > MAX_CHUNK_SIZE {
        let mut chunk_size = MAX_CHUNK_SIZE;
        let next_chunk_size = rest.len() - MAX_CHUNK_SIZE;
        if next_chunk_size < MIN_CHUNK_SIZE {
            chunk_size = rest.len().div_ceil(2);
        }
        let (chunk, remainder) = rest.split_at(chunk_size);
        chunks.push(chunk);
        rest = remainder;
    }
    chunks.push(rest);
    chunks
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn note(offset: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[24..].copy_from_slice(&offset.to_be_bytes());
    buf
}

/// One node of the Merkle tree: its hash and the end-byte-offset of the
/// data range it covers (used as the "note" domain separator for its
/// parent).
struct Node {
    hash: [u8; 32],
    max_offset: u64,
}

fn hash_leaf(chunk: &[u8], end_offset: u64) -> Node {
    let chunk_hash = sha256(chunk);
    let offset_hash = sha256(&note(end_offset));
    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(&chunk_hash);
    combined.extend_from_slice(&offset_hash);
    Node {
        hash: sha256(&combined),
        max_offset: end_offset,
    }
}

fn hash_branch(left: &Node, right: &Node) -> Node {
    let left_hash = sha256(&left.hash);
    let right_hash = sha256(&right.hash);
    let offset_hash = sha256(&note(left.max_offset));
    let mut combined = Vec::with_capacity(96);
    combined.extend_from_slice(&left_hash);
    combined.extend_from_slice(&right_hash);
    combined.extend_from_slice(&offset_hash);
    Node {
        hash: sha256(&combined),
        max_offset: right.max_offset,
    }
}

/// Computes the Merkle data root over `data`, domain-separating leaves from
/// internal nodes via the cumulative byte offset each node covers.
pub fn compute_data_root(data: &[u8]) -> String {
    let chunks = partition_chunks(data);
    let mut offset = 0u64;
    let mut level: Vec<Node> = chunks
        .into_iter()
        .map(|chunk| {
            offset += chunk.len() as u64;
            hash_leaf(chunk, offset)
        })
        .collect();

    if level.is_empty() {
        level.push(hash_leaf(&[], 0));
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut iter = level.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => next.push(hash_branch(&left, &right)),
                // Odd node out at this level: hoist unchanged.
                None => next.push(left),
            }
        }
        level = next;
    }

    URL_SAFE_NO_PAD.encode(level[0].hash)
}

/// Cross-checks a locally computed Merkle data root against the value a
/// trusted gateway reports at `/tx/{txId}/data_root`. Rejects bundled
/// (ans104) payloads outright: their Merkle structure belongs to the
/// wrapping bundle, not the plain-transaction chunk layout this strategy
/// assumes.
pub struct DataRootVerification {
    client: reqwest::Client,
    trusted_gateways: Vec<Gateway>,
    classifier: Arc<dyn DataClassifier>,
}

impl DataRootVerification {
    pub fn new(
        client: reqwest::Client,
        trusted_gateways: Vec<Gateway>,
        classifier: Arc<dyn DataClassifier>,
    ) -> Self {
        Self {
            client,
            trusted_gateways,
            classifier,
        }
    }

    async fn fetch_trusted_data_root(&self, tx_id: &str) -> Result<String, WayfinderError> {
        for gateway in &self.trusted_gateways {
            let url = format!("{}/tx/{}/data_root", gateway.request_url(None, ""), tx_id);
            if let Ok(resp) = self.client.get(&url).send().await {
                if resp.status().is_success() {
                    if let Ok(text) = resp.text().await {
                        let trimmed = text.trim().to_string();
                        if !trimmed.is_empty() {
                            return Ok(trimmed);
                        }
                    }
                }
            }
        }
        Err(WayfinderError::verification_failed(
            "data-root",
            "no trusted gateway returned a data_root",
        ))
    }
}

#[async_trait]
impl VerificationStrategy for DataRootVerification {
    async fn verify_data(
        &self,
        mut data: ByteStream,
        input: VerifyInput,
    ) -> Result<VerificationResult, WayfinderError> {
        let tx_id = input.tx_id.clone();

        if self.classifier.is_bundled(&tx_id).await? {
            return Err(WayfinderError::UnsupportedForBundled { tx_id });
        }

        let mut buffer = Vec::new();
        while let Some(chunk) = data.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        let trusted_root = self.fetch_trusted_data_root(&tx_id).await?;
        let computed_root = compute_data_root(&buffer);

        if computed_root != trusted_root {
            return Err(WayfinderError::DataRootMismatch { tx_id });
        }

        Ok(VerificationResult {
            tx_id,
            verified: true,
            hash: Some(computed_root),
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
        "data-root"
    }
}
