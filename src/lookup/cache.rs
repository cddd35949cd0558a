//! Persistent interpretation cache with per-entry TTL.
//!
//! Entries live in the key-value store under their fingerprint key. Expiry
//! is lazy: nothing sweeps the store, the read that observes an expired
//! entry deletes it and reports a miss. Every successful write fans out a
//! cache-updated broadcast so pages showing the same term can refresh.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::Broadcast;
use crate::storage::{Storage, StorageError};
use crate::tabs::TabRegistry;

use super::fingerprint::cache_key;

/// TTL stamped on remote write-backs: 7 days.
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 3600;

/// One cached interpretation. Field names mirror the stored JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The single-line interpretation shown in the tooltip.
    #[serde(rename = "line")]
    pub meaning_line: String,
    /// Unix milliseconds at write time.
    #[serde(rename = "ts")]
    pub created_at_ms: u64,
    /// Lifetime in seconds. None means the entry never expires.
    #[serde(rename = "ttl", skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Hostname of the API that produced the line.
    #[serde(rename = "host", skip_serializing_if = "Option::is_none")]
    pub source_host: Option<String>,
}

impl CacheEntry {
    /// Entry stamped with the current wall clock.
    pub fn new(meaning_line: String, ttl_secs: Option<u64>, source_host: Option<String>) -> Self {
        Self {
            meaning_line,
            created_at_ms: now_ms(),
            ttl_secs,
            source_host,
        }
    }

    /// Strictly-older-than-TTL check: an entry at exactly its TTL boundary
    /// is still valid.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.ttl_secs {
            Some(ttl) => now_ms.saturating_sub(self.created_at_ms) > ttl * 1000,
            None => false,
        }
    }
}

/// Second lookup tier: storage-backed cache keyed by (term, context).
pub struct JargonCache {
    storage: Arc<Storage>,
    tabs: Arc<TabRegistry>,
}

impl JargonCache {
    pub fn new(storage: Arc<Storage>, tabs: Arc<TabRegistry>) -> Self {
        Self { storage, tabs }
    }

    /// Fetch the live entry for (term, context), evicting it first if the
    /// current read finds it expired.
    pub fn get(&self, term: &str, context: &str) -> Result<Option<CacheEntry>, StorageError> {
        self.get_at(term, context, now_ms())
    }

    fn get_at(&self, term: &str, context: &str, now_ms: u64) -> Result<Option<CacheEntry>, StorageError> {
        let key = cache_key(term, context);
        let Some(entry) = self.storage.get::<CacheEntry>(&key)? else {
            return Ok(None);
        };
        if entry.is_expired_at(now_ms) {
            self.storage.remove(&key)?;
            debug!(key = %key, "expired cache entry evicted");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Persist `entry` under the fingerprint key and notify every page.
    /// Broadcast delivery is best-effort; a page that went away is skipped.
    pub fn set(&self, term: &str, context: &str, entry: CacheEntry) -> Result<(), StorageError> {
        let key = cache_key(term, context);
        self.storage.set(&key, &entry)?;
        let delivered = self.tabs.broadcast(&Broadcast::CacheUpdated {
            key: key.clone(),
            entry,
        });
        debug!(key = %key, delivered, "cache entry written");
        Ok(())
    }
}

/// Current wall clock as Unix milliseconds.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
