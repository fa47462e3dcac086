//! Remote Schema Fetching
//!
//! The resolver asks a [`RemoteFetcher`] for documents named by remote
//! `$ref` targets. URLs arrive with the fragment already stripped; fragment
//! traversal happens in the resolver after the document is built.
//!
//! Fetchers compose: offline mirrors are consulted before the network via
//! [`ChainFetcher`].

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{FetchConfig, MirrorConfig};

/// Why a remote document could not be produced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("No document at {0}")]
    NotFound(String),

    #[error("Remote fetching disabled, cannot load {0}")]
    Disabled(String),

    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Unparsable document at {url}: {reason}")]
    Parse { url: String, reason: String },
}

/// Remote Fetch Collaborator
pub trait RemoteFetcher: Send + Sync {
    /// Load the document at `url` (no fragment)
    fn fetch(&self, url: &Url) -> Result<Value, FetchError>;
}

fn parse_document(url: &Url, text: &str) -> Result<Value, FetchError> {
    serde_json::from_str(text).map_err(|e| FetchError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Implementations
// =============================================================================

/// Refuses every request
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFetch;

impl RemoteFetcher for NoFetch {
    fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        Err(FetchError::Disabled(url.to_string()))
    }
}

/// In-memory documents keyed by URL
#[derive(Debug, Default, Clone)]
pub struct MapFetcher {
    documents: HashMap<String, Value>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document; the key is normalized like a parsed URL
    pub fn insert(&mut self, url: &str, document: Value) {
        let key = Url::parse(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string());
        self.documents.insert(key, document);
    }

    pub fn with(mut self, url: &str, document: Value) -> Self {
        self.insert(url, document);
        self
    }
}

impl RemoteFetcher for MapFetcher {
    fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        self.documents
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

/// Serves `file://` URLs and URL prefixes mirrored on disk
#[derive(Debug, Default, Clone)]
pub struct DirectoryFetcher {
    mirrors: Vec<MirrorConfig>,
}

impl DirectoryFetcher {
    pub fn new(mirrors: Vec<MirrorConfig>) -> Self {
        Self { mirrors }
    }

    fn local_path(&self, url: &Url) -> Option<PathBuf> {
        if url.scheme() == "file" {
            return url.to_file_path().ok();
        }
        self.mirrors.iter().find_map(|m| {
            url.as_str()
                .strip_prefix(m.prefix.as_str())
                .map(|rest| m.dir.join(rest.trim_start_matches('/')))
        })
    }
}

impl RemoteFetcher for DirectoryFetcher {
    fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        let path = self
            .local_path(url)
            .ok_or_else(|| FetchError::NotFound(url.to_string()))?;
        debug!(url = %url, path = %path.display(), "Loading mirrored schema");
        let text = fs::read_to_string(&path).map_err(|_| FetchError::NotFound(url.to_string()))?;
        parse_document(url, &text)
    }
}

/// Blocking HTTP(S) fetcher
#[cfg(feature = "http")]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::NotFound(url.to_string()));
        }
        debug!(url = %url, "Fetching remote schema");
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self
            .client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(transport)?;
        let text = response.text().map_err(transport)?;
        parse_document(url, &text)
    }
}

/// Tries each fetcher in order; the first document wins
#[derive(Default)]
pub struct ChainFetcher {
    fetchers: Vec<Box<dyn RemoteFetcher>>,
}

impl ChainFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, fetcher: impl RemoteFetcher + 'static) -> Self {
        self.fetchers.push(Box::new(fetcher));
        self
    }

    /// Mirrors first, then the network when enabled
    pub fn from_config(config: &FetchConfig) -> Self {
        let chain = Self::new().push(DirectoryFetcher::new(config.offline.clone()));
        if !config.enabled {
            return chain;
        }

        #[cfg(feature = "http")]
        {
            match HttpFetcher::new(std::time::Duration::from_secs(config.timeout_secs)) {
                Ok(http) => return chain.push(http),
                Err(e) => tracing::warn!(error = %e, "HTTP fetcher unavailable"),
            }
        }
        chain
    }
}

impl RemoteFetcher for ChainFetcher {
    fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        let mut last = FetchError::NotFound(url.to_string());
        for fetcher in &self.fetchers {
            match fetcher.fetch(url) {
                Ok(document) => return Ok(document),
                // A more specific error beats "not here"
                Err(FetchError::NotFound(_)) => {}
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_fetcher() {
        let fetcher = MapFetcher::new().with("http://example.com/a.json", json!({ "type": "string" }));
        let url = Url::parse("http://example.com/a.json").unwrap();
        assert_eq!(fetcher.fetch(&url).unwrap(), json!({ "type": "string" }));

        let missing = Url::parse("http://example.com/b.json").unwrap();
        assert!(matches!(fetcher.fetch(&missing), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_directory_mirror() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("item.json"), r#"{"type": "integer"}"#).unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let fetcher = DirectoryFetcher::new(vec![MirrorConfig {
            prefix: "http://schemas.example.com/".to_string(),
            dir: dir.path().to_path_buf(),
        }]);

        let url = Url::parse("http://schemas.example.com/item.json").unwrap();
        assert_eq!(fetcher.fetch(&url).unwrap(), json!({ "type": "integer" }));

        let broken = Url::parse("http://schemas.example.com/broken.json").unwrap();
        assert!(matches!(fetcher.fetch(&broken), Err(FetchError::Parse { .. })));

        let file_url = Url::from_file_path(dir.path().join("item.json")).unwrap();
        assert!(fetcher.fetch(&file_url).is_ok());
    }

    #[test]
    fn test_chain_order() {
        let chain = ChainFetcher::new()
            .push(MapFetcher::new().with("http://example.com/a.json", json!({ "title": "first" })))
            .push(MapFetcher::new()
                .with("http://example.com/a.json", json!({ "title": "second" }))
                .with("http://example.com/b.json", json!({ "title": "fallback" })));

        let a = Url::parse("http://example.com/a.json").unwrap();
        let b = Url::parse("http://example.com/b.json").unwrap();
        assert_eq!(chain.fetch(&a).unwrap()["title"], "first");
        assert_eq!(chain.fetch(&b).unwrap()["title"], "fallback");

        let disabled = ChainFetcher::new().push(NoFetch);
        assert!(matches!(disabled.fetch(&a), Err(FetchError::Disabled(_))));
    }
}
