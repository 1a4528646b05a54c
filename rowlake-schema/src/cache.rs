//! TTL cache for mapped table schemas.
//!
//! Source schemas change rarely, so a table's mapped field list is reused
//! for days at a time instead of re-introspecting the source store on
//! every call. Entries expire after a fixed TTL; expiry is the only
//! invalidation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::field::Field;

/// Default lifetime of a cached mapping: five days.
pub const DEFAULT_MAPPING_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Statistics about cache usage.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of insertions.
    pub insertions: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    fields: Vec<Field>,
    expires_at: Instant,
}

/// A thread-safe TTL cache of mapped table schemas, keyed by table name.
#[derive(Debug)]
pub struct CachedMapper {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
    stats: RwLock<CacheStats>,
}

impl CachedMapper {
    /// Create a cache with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_MAPPING_TTL)
    }

    /// Create a cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Get the mapped fields for a table, if present and not expired.
    pub fn get(&self, table: &str) -> Option<Vec<Field>> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(table) {
                if entry.expires_at > Instant::now() {
                    self.stats.write().hits += 1;
                    debug!(table, "mapping cache hit");
                    return Some(entry.fields.clone());
                }
            }
        }

        self.stats.write().misses += 1;
        debug!(table, "mapping cache miss");
        None
    }

    /// Store the mapped fields for a table.
    pub fn store(&self, table: impl Into<String>, fields: Vec<Field>) {
        let table = table.into();
        let entry = Entry {
            fields,
            expires_at: Instant::now() + self.ttl,
        };

        self.entries.write().insert(table, entry);
        self.stats.write().insertions += 1;
    }

    /// Number of cached tables, expired entries included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

impl Default for CachedMapper {
    fn default() -> Self {
        Self::new()
    }
}
