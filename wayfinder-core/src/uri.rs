use crate::error::WayfinderError;
use data_encoding::{BASE32_NOPAD, BASE64URL_NOPAD};
use regex::Regex;
use std::sync::OnceLock;

const SCHEME: &str = "ar://";

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z0-9_-]{1,42}|[a-z0-9_-]{44,51})$").unwrap())
}

/// A parsed `ar://<ident>[/<path>]` address.
///
/// Exactly one of `tx_id` / `arns_name` is set. `subdomain` is the sandbox
/// origin: the ArNS name when the identifier is a name, otherwise the
/// lowercase unpadded base32 encoding of the raw txId bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub tx_id: Option<String>,
    pub arns_name: Option<String>,
    pub subdomain: String,
    pub path: String,
}

impl Uri {
    /// Parse an `ar://` address. Non-`ar://` input is not this function's
    /// concern — callers check the scheme first and bypass the pipeline.
    pub fn parse(input: &str) -> Result<Self, WayfinderError> {
        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| WayfinderError::InvalidUri(format!("missing ar:// scheme: {input}")))?;

        if rest.is_empty() {
            return Err(WayfinderError::InvalidUri("empty identifier".into()));
        }

        let (ident, path) = match rest.find('/') {
            Some(pos) => (&rest[..pos], rest[pos + 1..].to_string()),
            None => (rest, String::new()),
        };

        if is_tx_id(ident) {
            let subdomain = sandbox_subdomain(ident)?;
            return Ok(Self {
                tx_id: Some(ident.to_string()),
                arns_name: None,
                subdomain,
                path,
            });
        }

        if name_re().is_match(ident) {
            return Ok(Self {
                tx_id: None,
                arns_name: Some(ident.to_string()),
                subdomain: ident.to_string(),
                path,
            });
        }

        Err(WayfinderError::InvalidUri(format!(
            "identifier is neither a valid txId nor a valid ArNS name: {ident}"
        )))
    }

    /// `true` when `input` begins with the `ar://` scheme this resolver owns.
    pub fn is_ar_uri(input: &str) -> bool {
        input.starts_with(SCHEME)
    }
}

/// A txId is exactly 43 base64url characters (256-bit digest, unpadded).
pub fn is_tx_id(s: &str) -> bool {
    s.len() == 43 && s.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
    })
}

fn decode_tx_id_bytes(tx_id: &str) -> Result<Vec<u8>, WayfinderError> {
    BASE64URL_NOPAD
        .decode(tx_id.as_bytes())
        .map_err(|e| WayfinderError::InvalidUri(format!("malformed txId {tx_id}: {e}")))
}

/// The sandbox origin for a txId: lowercase unpadded base32 (RFC 4648) over
/// the raw digest bytes. Used to isolate each piece of content onto its own
/// DOM origin when routing by subdomain.
pub fn sandbox_subdomain(tx_id: &str) -> Result<String, WayfinderError> {
    Ok(BASE32_NOPAD.encode(&decode_tx_id_bytes(tx_id)?).to_lowercase())
}
