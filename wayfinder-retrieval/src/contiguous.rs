use async_trait::async_trait;
use futures_util::StreamExt;
use wayfinder_core::{DataRetrievalStrategy, RetrievalRequest, RetrievedResponse, WayfinderError};

/// A single GET against the already-built request URL, propagating
/// caller-supplied headers and returning the response as-is.
pub struct ContiguousDataRetrieval {
    client: reqwest::Client,
}

impl ContiguousDataRetrieval {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ContiguousDataRetrieval {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl DataRetrievalStrategy for ContiguousDataRetrieval {
    async fn get_data(&self, req: RetrievalRequest) -> Result<RetrievedResponse, WayfinderError> {
        let mut builder = self.client.get(&req.request_url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| WayfinderError::RetrievalFailed(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| WayfinderError::RetrievalFailed(e.to_string())));

        Ok(RetrievedResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use std::collections::HashMap;
    use wayfinder_core::Gateway;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn gets_body_status_and_headers_propagating_request_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc123"))
            .and(header("x-custom", "yes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"hello world".to_vec())
                    .insert_header("content-type", "text/plain"),
            )
            .mount(&server)
            .await;

        let strategy = ContiguousDataRetrieval::default();
        let mut headers = HashMap::new();
        headers.insert("x-custom".to_string(), "yes".to_string());
        let req = RetrievalRequest {
            gateway: Gateway::parse(&server.uri()).unwrap(),
            request_url: format!("{}/abc123", server.uri()),
            headers,
        };

        let resp = strategy.get_data(req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.headers.get("content-type").map(String::as_str), Some("text/plain"));

        let body: Vec<u8> = resp
            .body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap();
        assert_eq!(body, b"hello world");
    }
}
