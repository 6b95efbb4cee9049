use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use serde::Deserialize;
use wayfinder_core::{DataRetrievalStrategy, RetrievalRequest, RetrievedResponse, WayfinderError};

const HEADER_ROOT_TX_ID: &str = "x-ar-io-root-transaction-id";
const HEADER_ROOT_DATA_OFFSET: &str = "x-ar-io-root-data-offset";
const HEADER_CHUNK_READ_OFFSET: &str = "x-arweave-chunk-read-offset";
const HEADER_CHUNK_START_OFFSET: &str = "x-arweave-chunk-start-offset";
const HEADER_CHUNK_TX_ID: &str = "x-arweave-chunk-tx-id";

#[derive(Debug, Deserialize)]
struct OffsetResponse {
    offset: String,
    size: String,
}

/// Retrieves a data item that lives at a relative offset inside a larger
/// root transaction: HEAD for metadata, resolve the item's absolute start
/// via `/tx/{rootTxId}/offset`, then walk `/chunk/{offset}/data` until
/// `contentLength` bytes have been produced.
pub struct ChunkedDataRetrieval {
    client: reqwest::Client,
}

impl ChunkedDataRetrieval {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ChunkedDataRetrieval {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

struct ChunkCursor {
    client: reqwest::Client,
    chunk_base_url: String,
    root_tx_id: String,
    current_offset: i64,
    remaining: i64,
    done: bool,
}

async fn fetch_next_chunk(mut cursor: ChunkCursor) -> Option<(Result<Bytes, WayfinderError>, ChunkCursor)> {
    if cursor.done || cursor.remaining <= 0 {
        return None;
    }

    let url = format!("{}/chunk/{}/data", cursor.chunk_base_url, cursor.current_offset);
    let resp = match cursor.client.get(&url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            cursor.done = true;
            return Some((Err(WayfinderError::RetrievalFailed(e.to_string())), cursor));
        }
    };

    let headers = resp.headers().clone();
    let chunk_tx_id = headers
        .get(HEADER_CHUNK_TX_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let read_offset: i64 = headers
        .get(HEADER_CHUNK_READ_OFFSET)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let start_offset: i64 = match headers
        .get(HEADER_CHUNK_START_OFFSET)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
    {
        Some(v) => v,
        None => {
            cursor.done = true;
            return Some((
                Err(WayfinderError::RetrievalFailed("chunk response missing start offset header".into())),
                cursor,
            ));
        }
    };

    if chunk_tx_id != cursor.root_tx_id {
        tracing::warn!(
            expected = cursor.root_tx_id.as_str(),
            actual = chunk_tx_id.as_str(),
            offset = cursor.current_offset,
            "chunk tx id mismatch, aborting reassembly"
        );
        cursor.done = true;
        return Some((
            Err(WayfinderError::ChunkMismatch {
                expected: cursor.root_tx_id.clone(),
                actual: chunk_tx_id,
            }),
            cursor,
        ));
    }

    let body = match resp.bytes().await {
        Ok(body) => body,
        Err(e) => {
            cursor.done = true;
            return Some((Err(WayfinderError::RetrievalFailed(e.to_string())), cursor));
        }
    };

    let chunk_len = body.len() as i64;
    let read_offset = read_offset.clamp(0, chunk_len);
    let available = chunk_len - read_offset;
    let take = available.min(cursor.remaining).max(0) as usize;
    let slice = body.slice(read_offset as usize..read_offset as usize + take);

    cursor.remaining -= take as i64;
    cursor.current_offset = start_offset + chunk_len;
    if cursor.remaining <= 0 {
        cursor.done = true;
    }

    Some((Ok(slice), cursor))
}

#[async_trait]
impl DataRetrievalStrategy for ChunkedDataRetrieval {
    async fn get_data(&self, req: RetrievalRequest) -> Result<RetrievedResponse, WayfinderError> {
        let mut head_builder = self.client.head(&req.request_url);
        for (name, value) in &req.headers {
            head_builder = head_builder.header(name, value);
        }
        let head_resp = head_builder
            .send()
            .await
            .map_err(|e| WayfinderError::RetrievalFailed(e.to_string()))?;

        let status = head_resp.status().as_u16();
        let head_headers = head_resp.headers().clone();

        let root_tx_id = head_headers
            .get(HEADER_ROOT_TX_ID)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| WayfinderError::RetrievalFailed("missing root transaction id header".into()))?
            .to_string();
        let relative_offset: i64 = head_headers
            .get(HEADER_ROOT_DATA_OFFSET)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| WayfinderError::RetrievalFailed("missing root data offset header".into()))?;
        let content_length: i64 = head_headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| WayfinderError::RetrievalFailed("missing content-length header".into()))?;

        let chunk_base_url = req.gateway.request_url(None, "");
        let offset_url = format!("{chunk_base_url}/tx/{root_tx_id}/offset");
        let offset_resp: OffsetResponse = self
            .client
            .get(&offset_url)
            .send()
            .await
            .map_err(|e| WayfinderError::RetrievalFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| WayfinderError::RetrievalFailed(e.to_string()))?;

        let end_offset: i64 = offset_resp
            .offset
            .parse()
            .map_err(|_| WayfinderError::RetrievalFailed("non-numeric offset in /tx/offset response".into()))?;
        let size: i64 = offset_resp
            .size
            .parse()
            .map_err(|_| WayfinderError::RetrievalFailed("non-numeric size in /tx/offset response".into()))?;
        let root_start = end_offset - size + 1;
        let item_absolute_start = root_start + relative_offset;

        let cursor = ChunkCursor {
            client: self.client.clone(),
            chunk_base_url,
            root_tx_id,
            current_offset: item_absolute_start,
            remaining: content_length,
            done: false,
        };

        let body = stream::unfold(cursor, fetch_next_chunk);

        Ok(RetrievedResponse {
            status,
            headers: head_headers
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
                .collect(),
            body: Box::pin(body),
        })
    }
}
