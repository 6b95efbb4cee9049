use std::collections::HashMap;

use wayfinder_core::{Gateway, VerificationResult};
use wayfinder_manifest::Manifest;
use wayfinder_verify::ByteStream;

/// A routed, optionally-verified payload. `body` is the client-facing branch
/// of the tee — verification (if any) runs against a separate branch
/// concurrently, so reading `body` never blocks on it outside strict mode.
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ByteStream,
    pub gateway: Gateway,
}

/// Input to [`WayfinderClient::resolve_url`](crate::client::WayfinderClient::resolve_url).
/// Accepts whichever alias the caller already has on hand; exactly one of
/// these should be set.
#[derive(Debug, Clone, Default)]
pub struct ResolveUrlInput {
    pub original_url: Option<String>,
    pub wayfinder_url: Option<String>,
    pub tx_id: Option<String>,
    pub arns_name: Option<String>,
}

/// The bundled result of [`WayfinderClient::request_with_manifest`], combining
/// the routed response with the parsed manifest (if the fetched resource was
/// one) and the recursive verification outcome for every path it references.
pub struct ManifestResponse {
    pub response: Response,
    pub manifest: Option<Manifest>,
    pub verification_results: HashMap<String, VerificationResult>,
    pub all_verified: bool,
}
