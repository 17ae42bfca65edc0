//! Response cache: caller-side memoization policy
//!
//! The engine is a pure function of (text, registry snapshot) given a
//! deterministic enricher, so full responses are safe to memoize as
//! long as the registry version is part of the key. Used by callers
//! (the CLI batch path here), never inside `analyze` itself.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::types::AnalyzeResponse;

/// Key = sha256 over text, schema and registry version
pub fn cache_key(text: &str, schema_id: &str, registry_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(schema_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(registry_version.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A cached response and when it was stored
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response: AnalyzeResponse,
    pub stored_at: DateTime<Utc>,
}

/// Bounded in-memory LRU over full responses
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CachedResponse>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().ok()?;
        entries.get(key).cloned()
    }

    pub fn put(&self, key: String, response: AnalyzeResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                CachedResponse {
                    response,
                    stored_at: Utc::now(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// TESTS
// =============================================================================
