//! Memoized property lookups
//!
//! Property stores may shell out per lookup, so the polled monitor reads
//! them through a [`PropertyCache`]. Absent values and failed lookups are
//! cached as [`CachedValue::Empty`]. Entries never expire on their own; the
//! whole cache is cleared on network change or explicit refresh.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::{trace, warn};

use crate::traits::PropertyStore;

/// Cached lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Value(String),
    /// Negative result: absent, empty, or the lookup failed
    Empty,
}

impl CachedValue {
    pub fn as_value(&self) -> Option<&str> {
        match self {
            CachedValue::Value(value) => Some(value),
            CachedValue::Empty => None,
        }
    }
}

/// One cached property
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CachedValue,
    /// When this entry was inserted (for diagnostics)
    pub inserted_at: Instant,
}

/// Property lookup cache with full-invalidation semantics
#[derive(Debug, Default)]
pub struct PropertyCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value of `key`, consulting `store` on a miss
    ///
    /// The store is queried without holding the cache lock.
    pub fn get_or_load(&self, store: &dyn PropertyStore, key: &str) -> Option<String> {
        if let Some(entry) = self.lock().get(key) {
            trace!("Property cache hit: {}", key);
            return entry.value.as_value().map(str::to_string);
        }

        let value = match store.get(key) {
            Ok(Some(value)) if !value.trim().is_empty() => CachedValue::Value(value.trim().to_string()),
            Ok(_) => CachedValue::Empty,
            Err(e) => {
                warn!("Property lookup {} via {} failed: {}", key, store.name(), e);
                CachedValue::Empty
            }
        };

        let result = value.as_value().map(str::to_string);
        self.lock().insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        result
    }

    /// Cached entry for `key`, without loading
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
