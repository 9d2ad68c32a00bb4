// # Chained Property Store
//
// Ordered list of property stores tried in sequence. The first store that
// answers with a non-empty value wins. A store that errors is logged and
// skipped; the chain only errors when every store errored.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::PropertyStore;

/// Ordered fallback over several property stores
#[derive(Clone, Default)]
pub struct ChainedPropertyStore {
    stores: Vec<Arc<dyn PropertyStore>>,
}

impl ChainedPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stores(stores: Vec<Arc<dyn PropertyStore>>) -> Self {
        Self { stores }
    }

    /// Append a store at the lowest priority
    pub fn push(&mut self, store: Arc<dyn PropertyStore>) {
        self.stores.push(store);
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl PropertyStore for ChainedPropertyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut failures = Vec::new();

        for store in &self.stores {
            match store.get(key) {
                Ok(Some(value)) if !value.trim().is_empty() => {
                    debug!("Property {} answered by {}", key, store.name());
                    return Ok(Some(value));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Property store {} failed for {}: {}", store.name(), key, e);
                    failures.push(format!("{}: {}", store.name(), e));
                }
            }
        }

        if !self.stores.is_empty() && failures.len() == self.stores.len() {
            return Err(Error::property_store(format!(
                "All property stores failed for {}: {}",
                key,
                failures.join("; ")
            )));
        }

        Ok(None)
    }

    fn name(&self) -> &str {
        "chain"
    }
}

impl std::fmt::Debug for ChainedPropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stores.iter().map(|s| s.name()).collect();
        f.debug_struct("ChainedPropertyStore")
            .field("stores", &names)
            .finish()
    }
}
