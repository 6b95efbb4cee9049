use serde::{Deserialize, Serialize};
use std::fmt;

/// A gateway endpoint: an absolute URL with no path or query that the core
/// preserves. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gateway {
    url: String,
}

impl Gateway {
    /// Parse and normalize an absolute gateway URL (scheme + host [+ port]).
    pub fn parse(url: &str) -> Result<Self, String> {
        let parsed = url::Url::parse(url).map_err(|e| format!("invalid gateway url {url}: {e}"))?;
        if parsed.host_str().is_none() {
            return Err(format!("gateway url has no host: {url}"));
        }
        let mut normalized = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap());
        if let Some(port) = parsed.port() {
            normalized.push(':');
            normalized.push_str(&port.to_string());
        }
        Ok(Self { url: normalized })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        self.url
            .splitn(2, "://")
            .nth(1)
            .unwrap_or(&self.url)
            .split(':')
            .next()
            .unwrap_or("")
    }

    /// Build a request URL against this gateway for `path`, optionally
    /// prepending `subdomain` to the host (sandbox origin isolation).
    pub fn request_url(&self, subdomain: Option<&str>, path: &str) -> String {
        let scheme = self.url.splitn(2, "://").next().unwrap_or("https");
        let host_and_port = self.url.splitn(2, "://").nth(1).unwrap_or(self.url.as_str());
        let authority = match subdomain {
            Some(sub) if !sub.is_empty() => format!("{sub}.{host_and_port}"),
            _ => host_and_port.to_string(),
        };
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{scheme}://{authority}")
        } else {
            format!("{scheme}://{authority}/{path}")
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes() {
        let gw = Gateway::parse("https://arweave.net/").unwrap();
        assert_eq!(gw.as_str(), "https://arweave.net");
    }

    #[test]
    fn keeps_explicit_port() {
        let gw = Gateway::parse("http://localhost:1984").unwrap();
        assert_eq!(gw.as_str(), "http://localhost:1984");
        assert_eq!(gw.host(), "localhost");
    }

    #[test]
    fn rejects_hostless_url() {
        assert!(Gateway::parse("file:///etc/passwd").is_err());
    }

    #[test]
    fn request_url_without_subdomain() {
        let gw = Gateway::parse("https://arweave.net").unwrap();
        assert_eq!(
            gw.request_url(None, "abc123"),
            "https://arweave.net/abc123"
        );
    }

    #[test]
    fn request_url_with_subdomain_is_prepended_not_substituted() {
        let gw = Gateway::parse("https://arweave.net").unwrap();
        assert_eq!(
            gw.request_url(Some("sandboxabc"), "index.html"),
            "https://sandboxabc.arweave.net/index.html"
        );
    }

    #[test]
    fn request_url_with_empty_path() {
        let gw = Gateway::parse("https://arweave.net").unwrap();
        assert_eq!(gw.request_url(None, ""), "https://arweave.net");
    }
}
