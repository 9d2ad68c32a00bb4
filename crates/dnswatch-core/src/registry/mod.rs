//! Plugin-based property store registry
//!
//! Property stores are registered by name at runtime, so the daemon builds
//! its lookup chain from configuration without hardcoding implementations.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnswatch_core::registry::StoreRegistry;
//!
//! let registry = StoreRegistry::with_builtins();
//! dnswatch_getprop::register(&registry);
//!
//! let chain = registry.create_chain(&config.property_stores)?;
//! ```
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &StoreRegistry) {
//!     registry.register_store("getprop", Box::new(GetpropStoreFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::PropertyStoreConfig;
use crate::error::{Error, Result};
use crate::store::{ChainedPropertyStore, FilePropertyStoreFactory, MemoryPropertyStoreFactory};
use crate::traits::{PropertyStore, PropertyStoreFactory};

/// Registry of property store factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Box<dyn PropertyStoreFactory>>>,
}

impl StoreRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the builtin `memory` and `file` stores
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryPropertyStoreFactory));
        registry.register_store("file", Box::new(FilePropertyStoreFactory));
        registry
    }

    /// Register a property store factory
    ///
    /// # Parameters
    ///
    /// - `name`: Store type name (e.g., "getprop", "file")
    /// - `factory`: Factory object for creating store instances
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn PropertyStoreFactory>) {
        let name = name.into();
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name, factory);
    }

    /// Create a property store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn PropertyStore>)`: Created store instance
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub fn create_store(&self, config: &PropertyStoreConfig) -> Result<Box<dyn PropertyStore>> {
        let store_type = config.type_name();
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);

        let factory = stores
            .get(store_type)
            .ok_or_else(|| Error::config(format!("Unknown property store type: {}", store_type)))?;

        factory.create(config)
    }

    /// Build the ordered lookup chain for a list of store configurations
    pub fn create_chain(&self, configs: &[PropertyStoreConfig]) -> Result<ChainedPropertyStore> {
        let mut chain = ChainedPropertyStore::new();
        for config in configs {
            let store: Arc<dyn PropertyStore> = Arc::from(self.create_store(config)?);
            chain.push(store);
        }
        Ok(chain)
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
