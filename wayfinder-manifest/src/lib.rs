pub mod cache;
pub mod manifest;
pub mod verify;

pub use cache::ManifestVerificationCache;
pub use manifest::{looks_like_manifest, Manifest, ManifestIndex, ManifestPathEntry};
pub use verify::ManifestVerificationStrategy;
