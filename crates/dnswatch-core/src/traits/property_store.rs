// # Property Store Trait
//
// Defines the interface for OS-level network property lookup
// (`net.dns1`, `dhcp.wlan0.dns1`, ...).
//
// ## Implementations
//
// - `getprop` command: `dnswatch-getprop` crate
// - `key=value` files and in-memory maps: `crate::store`
// - Ordered fallback over any of the above: `ChainedPropertyStore`
//
// Lookups have no latency guarantee (a store may spawn a process), so
// the polled monitor reads them through its `PropertyCache`.

use crate::config::PropertyStoreConfig;
use crate::error::Result;

/// Trait for property store implementations
pub trait PropertyStore: Send + Sync {
    /// Look up a property
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: The property is set to a non-empty value
    /// - `Ok(None)`: The property is absent or empty
    /// - `Err(Error)`: The lookup itself failed
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Short name for logging
    fn name(&self) -> &str {
        "property-store"
    }
}

impl<T: PropertyStore + ?Sized> PropertyStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Factory trait for creating property stores from configuration
pub trait PropertyStoreFactory: Send + Sync {
    fn create(&self, config: &PropertyStoreConfig) -> Result<Box<dyn PropertyStore>>;
}
