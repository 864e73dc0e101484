//! External collaborator interface for dereferencing metadata references
//!
//! String-valued `dialect` and `tableSchema` properties are URL references
//! that must be dereferenced into objects during normalization. Transport is
//! out of scope here; callers supply an implementation and own retry and
//! timeout policy.

use serde_json::Value;

/// Fetches a referenced JSON document by absolute URL.
pub trait DocumentFetcher {
    fn fetch_json(&self, url: &str) -> anyhow::Result<Value>;
}

/// Default collaborator that refuses every fetch. Suitable for pipelines
/// whose metadata is fully inline.
pub struct NoFetch;

impl DocumentFetcher for NoFetch {
    fn fetch_json(&self, url: &str) -> anyhow::Result<Value> {
        anyhow::bail!("no document fetcher configured, cannot dereference '{url}'")
    }
}

/// In-memory fetcher backed by a URL → document map. Used by tests and by
/// callers that pre-fetch everything up front.
#[derive(Default)]
pub struct MapFetcher {
    documents: std::collections::HashMap<String, Value>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, document: Value) {
        self.documents.insert(url.into(), document);
    }
}

impl DocumentFetcher for MapFetcher {
    fn fetch_json(&self, url: &str) -> anyhow::Result<Value> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("document not found: '{url}'"))
    }
}
