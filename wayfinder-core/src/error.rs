use thiserror::Error;

/// Unified error type for the WayFinder pipeline.
#[derive(Error, Debug)]
pub enum WayfinderError {
    #[error("invalid ar:// uri: {0}")]
    InvalidUri(String),

    #[error("no gateways available")]
    NoGateways,

    #[error("gateway provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("no healthy gateway found")]
    NoHealthyGateway,

    #[error("all routing strategies failed")]
    AllStrategiesFailed,

    #[error("data retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("chunk metadata mismatch: expected root tx {expected}, got {actual}")]
    ChunkMismatch { expected: String, actual: String },

    #[error("digest mismatch for {tx_id}")]
    DigestMismatch { tx_id: String },

    #[error("data root mismatch for {tx_id}")]
    DataRootMismatch { tx_id: String },

    #[error("data-root verification unsupported for bundled payload {tx_id}")]
    UnsupportedForBundled { tx_id: String },

    #[error("verification failed: {kind}: {cause}")]
    VerificationFailed { kind: String, cause: String },

    #[error("manifest recursion exceeded max depth {max_depth}")]
    MaxDepthExceeded { max_depth: u32 },

    #[error("bad manifest entry: {0}")]
    BadManifestEntry(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl WayfinderError {
    /// Map to a coarse taxonomy tag, analogous to an HTTP status hint.
    pub fn kind(&self) -> &'static str {
        match self {
            WayfinderError::InvalidUri(_) => "InvalidUri",
            WayfinderError::NoGateways => "NoGateways",
            WayfinderError::ProviderUnavailable(_) => "ProviderUnavailable",
            WayfinderError::NoHealthyGateway => "NoHealthyGateway",
            WayfinderError::AllStrategiesFailed => "AllStrategiesFailed",
            WayfinderError::RetrievalFailed(_) => "RetrievalFailed",
            WayfinderError::ChunkMismatch { .. } => "ChunkMismatch",
            WayfinderError::DigestMismatch { .. } => "DigestMismatch",
            WayfinderError::DataRootMismatch { .. } => "DataRootMismatch",
            WayfinderError::UnsupportedForBundled { .. } => "UnsupportedForBundled",
            WayfinderError::VerificationFailed { .. } => "VerificationFailed",
            WayfinderError::MaxDepthExceeded { .. } => "MaxDepthExceeded",
            WayfinderError::BadManifestEntry(_) => "BadManifestEntry",
            WayfinderError::NotFound(_) => "NotFound",
            WayfinderError::Cancelled => "Cancelled",
            WayfinderError::Io(_) => "Io",
            WayfinderError::Serde(_) => "Serde",
            WayfinderError::Internal(_) => "Internal",
        }
    }

    pub fn verification_failed(kind: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        WayfinderError::VerificationFailed {
            kind: kind.into(),
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(WayfinderError::NoGateways.kind(), "NoGateways");
        assert_eq!(WayfinderError::NoHealthyGateway.kind(), "NoHealthyGateway");
        assert_eq!(
            WayfinderError::ChunkMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .kind(),
            "ChunkMismatch"
        );
    }

    #[test]
    fn verification_failed_helper_formats_cause() {
        let err = WayfinderError::verification_failed("hash", "boom");
        assert_eq!(err.to_string(), "verification failed: hash: boom");
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            WayfinderError::InvalidUri("bad scheme".into()).to_string(),
            "invalid ar:// uri: bad scheme"
        );
        assert_eq!(
            WayfinderError::DigestMismatch { tx_id: "abc".into() }.to_string(),
            "digest mismatch for abc"
        );
    }
}
