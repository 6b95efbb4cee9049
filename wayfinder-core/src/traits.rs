use crate::error::WayfinderError;
use crate::gateway::Gateway;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Source of `Gateway` sets. Implementations may cache; on success they
/// return a non-empty sequence, on failure they raise `ProviderUnavailable`
/// only when there is no valid cached value to fall back on.
#[async_trait]
pub trait GatewaysProvider: Send + Sync {
    async fn get_gateways(&self) -> Result<Vec<Gateway>, WayfinderError>;
}

/// Input to a routing decision.
#[derive(Debug, Clone, Default)]
pub struct SelectGatewayInput {
    pub gateways: Option<Vec<Gateway>>,
    pub path: Option<String>,
    pub subdomain: Option<String>,
}

/// A routing decision policy: a (possibly stateful) pure function of its
/// internal state and the supplied input. Never mutates the gateway list it
/// is handed.
#[async_trait]
pub trait RoutingStrategy: Send + Sync {
    async fn select_gateway(&self, input: SelectGatewayInput) -> Result<Gateway, WayfinderError>;
}

/// A streamed HTTP response: status, headers, and a body stream of bytes
/// chunks. `RetrievalFailed` / transport errors surface as a body item.
pub struct RetrievedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<Bytes, WayfinderError>> + Send>>,
}

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub gateway: Gateway,
    pub request_url: String,
    pub headers: HashMap<String, String>,
}

/// Transport policy: issue the request and hand back a streaming response.
#[async_trait]
pub trait DataRetrievalStrategy: Send + Sync {
    async fn get_data(&self, req: RetrievalRequest) -> Result<RetrievedResponse, WayfinderError>;
}

/// Outcome of verifying one identifier's bytes.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub tx_id: String,
    pub verified: bool,
    pub hash: Option<String>,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub content: Option<Bytes>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct VerifyInput {
    pub tx_id: String,
    pub headers: HashMap<String, String>,
}

/// Integrity policy applied to one branch of a tee'd body stream.
#[async_trait]
pub trait VerificationStrategy: Send + Sync {
    /// Consume `data` (one tee branch) and resolve with a verification
    /// outcome, or raise `VerificationFailed`.
    async fn verify_data(
        &self,
        data: std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<Bytes, WayfinderError>> + Send>>,
        input: VerifyInput,
    ) -> Result<VerificationResult, WayfinderError>;

    /// Trusted gateways this strategy consults, if any. Used by
    /// `ManifestVerification` to reject strategies that can't fetch nested
    /// resources (e.g. `RemoteVerification`).
    fn trusted_gateways(&self) -> &[Gateway] {
        &[]
    }

    fn name(&self) -> &'static str;
}

/// Classifies payload data as a plain transaction or a bundled (ans104)
/// data item; data-root verification is undefined for the latter.
#[async_trait]
pub trait DataClassifier: Send + Sync {
    async fn is_bundled(&self, tx_id: &str) -> Result<bool, WayfinderError>;
}
