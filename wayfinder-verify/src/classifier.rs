use async_trait::async_trait;
use serde::Deserialize;
use wayfinder_core::{DataClassifier, WayfinderError};

/// Classifies a txId as a plain transaction or a bundled (ans104) data item
/// by querying a gateway's GraphQL endpoint for its bundle membership.
/// Data-root (Merkle) verification is undefined for bundled payloads, since
/// the bundle's own Merkle structure diverges from the wrapping
/// transaction's chunk layout.
pub struct GraphqlDataClassifier {
    client: reqwest::Client,
    graphql_url: String,
}

impl GraphqlDataClassifier {
    pub fn new(client: reqwest::Client, graphql_url: impl Into<String>) -> Self {
        Self {
            client,
            graphql_url: graphql_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: GraphqlData,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    transaction: Option<TransactionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionNode {
    bundled_in: Option<BundledIn>,
}

#[derive(Debug, Deserialize)]
struct BundledIn {
    id: Option<String>,
}

const QUERY: &str = "query($id: ID!) { transaction(id: $id) { bundledIn { id } } }";

#[async_trait]
impl DataClassifier for GraphqlDataClassifier {
    async fn is_bundled(&self, tx_id: &str) -> Result<bool, WayfinderError> {
        let body = serde_json::json!({
            "query": QUERY,
            "variables": { "id": tx_id },
        });

        let resp: GraphqlResponse = self
            .client
            .post(&self.graphql_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WayfinderError::verification_failed("classifier", e))?
            .json()
            .await
            .map_err(|e| WayfinderError::verification_failed("classifier", e))?;

        Ok(resp
            .data
            .transaction
            .and_then(|t| t.bundled_in)
            .and_then(|b| b.id)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn bundled_transaction_is_detected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "transaction": { "bundledIn": { "id": "parent-tx" } } }
            })))
            .mount(&server)
            .await;

        let classifier = GraphqlDataClassifier::new(reqwest::Client::new(), server.uri());
        assert!(classifier.is_bundled("any").await.unwrap());
    }

    #[tokio::test]
    async fn plain_transaction_is_not_bundled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "transaction": { "bundledIn": null } }
            })))
            .mount(&server)
            .await;

        let classifier = GraphqlDataClassifier::new(reqwest::Client::new(), server.uri());
        assert!(!classifier.is_bundled("any").await.unwrap());
    }
}
