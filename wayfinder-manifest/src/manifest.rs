use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use wayfinder_core::{is_tx_id, WayfinderError};

/// `{manifest:"arweave/paths", version, index?, paths:{name -> {id}}}`, the
/// path -> txId map a manifest transaction's content describes.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub manifest: String,
    pub version: String,
    #[serde(default)]
    pub index: Option<ManifestIndex>,
    pub paths: HashMap<String, ManifestPathEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestIndex {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestPathEntry {
    pub id: String,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, WayfinderError> {
        serde_json::from_slice(bytes).map_err(WayfinderError::Serde)
    }

    /// Resolves `path` to a txId. Leading/trailing slashes are trimmed;
    /// an empty (or `/`) path resolves through `index.path` when present.
    pub fn resolve(&self, path: &str) -> Result<&str, WayfinderError> {
        let trimmed = path.trim_matches('/');
        let key = if trimmed.is_empty() {
            self.index
                .as_ref()
                .map(|i| i.path.as_str())
                .ok_or_else(|| WayfinderError::NotFound("no index path configured".into()))?
        } else {
            trimmed
        };
        self.paths
            .get(key)
            .map(|entry| entry.id.as_str())
            .ok_or_else(|| WayfinderError::NotFound(format!("path not found: {key}")))
    }

    /// Every distinct txId this manifest references directly (not
    /// recursively). Each must be a well-formed 43-char base64url txId;
    /// callers surface `BadManifestEntry` for any that aren't.
    pub fn referenced_tx_ids(&self) -> Result<Vec<String>, WayfinderError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entry in self.paths.values() {
            if !is_tx_id(&entry.id) {
                return Err(WayfinderError::BadManifestEntry(entry.id.clone()));
            }
            if seen.insert(entry.id.clone()) {
                out.push(entry.id.clone());
            }
        }
        Ok(out)
    }
}

/// Case-insensitive check for the manifest content-type, or any JSON-like
/// content-type (parsed as a candidate manifest and validated structurally).
/// Header names arriving from the retrieval layer are already lowercased by
/// `http`/`reqwest`, so a literal-lowercase substring check is sufficient.
pub fn looks_like_manifest(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let lower = ct.to_ascii_lowercase();
            lower.contains("application/x.arweave-manifest+json") || lower.contains("json")
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "manifest": "arweave/paths",
            "version": "0.1.0",
            "index": { "path": "index.html" },
            "paths": {
                "index.html": { "id": "a".repeat(43) },
                "about/index.html": { "id": "b".repeat(43) },
            }
        })
    }

    #[test]
    fn parses_and_resolves_index_for_empty_path() {
        let manifest = Manifest::parse(sample_json().to_string().as_bytes()).unwrap();
        assert_eq!(manifest.resolve("").unwrap(), "a".repeat(43));
        assert_eq!(manifest.resolve("/").unwrap(), "a".repeat(43));
    }

    #[test]
    fn resolves_exact_path_trimming_slashes() {
        let manifest = Manifest::parse(sample_json().to_string().as_bytes()).unwrap();
        assert_eq!(manifest.resolve("/about/index.html/").unwrap(), "b".repeat(43));
    }

    #[test]
    fn missing_path_is_not_found() {
        let manifest = Manifest::parse(sample_json().to_string().as_bytes()).unwrap();
        assert!(matches!(manifest.resolve("nope"), Err(WayfinderError::NotFound(_))));
    }

    #[test]
    fn referenced_tx_ids_are_deduplicated() {
        let mut json = sample_json();
        json["paths"]["dup.html"] = serde_json::json!({ "id": "a".repeat(43) });
        let manifest = Manifest::parse(json.to_string().as_bytes()).unwrap();
        let ids = manifest.referenced_tx_ids().unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn malformed_tx_id_is_rejected() {
        let mut json = sample_json();
        json["paths"]["bad.html"] = serde_json::json!({ "id": "not-a-valid-tx-id" });
        let manifest = Manifest::parse(json.to_string().as_bytes()).unwrap();
        assert!(matches!(manifest.referenced_tx_ids(), Err(WayfinderError::BadManifestEntry(_))));
    }

    #[test]
    fn content_type_detection_is_case_insensitive() {
        assert!(looks_like_manifest(Some("application/x.arweave-manifest+json")));
        assert!(looks_like_manifest(Some("APPLICATION/X.ARWEAVE-MANIFEST+JSON")));
        assert!(looks_like_manifest(Some("Application/Json")));
        assert!(!looks_like_manifest(Some("text/html")));
        assert!(!looks_like_manifest(None));
    }
}
