// # Memory Property Store
//
// In-memory implementation of PropertyStore.
//
// ## When to Use
//
// - Embedding applications that receive properties from elsewhere
// - Fixed overrides configured in `property_stores`
// - Tests

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::PropertyStoreConfig;
use crate::error::{Error, Result};
use crate::traits::{PropertyStore, PropertyStoreFactory};

/// In-memory property store
///
/// Clones share the same map.
///
/// # Example
///
/// ```rust
/// use dnswatch_core::store::MemoryPropertyStore;
/// use dnswatch_core::traits::PropertyStore;
///
/// let store = MemoryPropertyStore::new();
/// store.set("net.dns1", "8.8.8.8");
/// assert_eq!(store.get("net.dns1").unwrap().as_deref(), Some("8.8.8.8"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryPropertyStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryPropertyStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Get the number of properties in the store
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all properties from the store
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(key).filter(|value| !value.is_empty()).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Factory for creating memory property stores
pub struct MemoryPropertyStoreFactory;

impl PropertyStoreFactory for MemoryPropertyStoreFactory {
    fn create(&self, config: &PropertyStoreConfig) -> Result<Box<dyn PropertyStore>> {
        match config {
            PropertyStoreConfig::Memory { values } => {
                Ok(Box::new(MemoryPropertyStore::from_map(values.clone())))
            }
            other => Err(Error::config(format!(
                "Memory store factory cannot build a {} store",
                other.type_name()
            ))),
        }
    }
}
