//! Heuristic DNS discovery pipeline of the polled monitor
//!
//! Strategies, in order:
//!
//! 1. **Structured lookup**: DNS servers in the active network's link
//!    properties. Authoritative when non-empty; the rest is skipped.
//! 2. **Property probe**: generic keys (`net.dns1`..`net.dns4`), then the
//!    per-interface keys in priority order. The first interface whose
//!    primary key hits also contributes its secondary key, and the scan
//!    stops there.
//! 3. **Interface enumeration**: per-link resolvers of up, non-loopback
//!    interfaces. May legitimately yield nothing.
//!
//! Results of 2 and 3 are unioned. A failing strategy is logged and
//! skipped; the pipeline only errors when every configured strategy failed.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::PropertyCache;
use crate::config::{InterfacePropertyKeys, PolledMonitorConfig};
use crate::dns::{parse_literal_ip, DnsServerSet};
use crate::error::{Error, Result};
use crate::traits::{InterfaceEnumerator, NetworkObserver, PropertyStore};

pub(crate) struct DiscoveryPipeline {
    observer: Option<Arc<dyn NetworkObserver>>,
    properties: Option<Arc<dyn PropertyStore>>,
    interfaces: Option<Arc<dyn InterfaceEnumerator>>,
    cache: PropertyCache,
    generic_keys: Vec<String>,
    interface_keys: Vec<InterfacePropertyKeys>,
}

impl DiscoveryPipeline {
    pub(crate) fn new(
        config: &PolledMonitorConfig,
        observer: Option<Arc<dyn NetworkObserver>>,
        properties: Option<Arc<dyn PropertyStore>>,
        interfaces: Option<Arc<dyn InterfaceEnumerator>>,
    ) -> Self {
        Self {
            observer,
            properties,
            interfaces,
            cache: PropertyCache::new(),
            generic_keys: config.generic_property_keys.clone(),
            interface_keys: config.interface_property_keys.clone(),
        }
    }

    pub(crate) fn cache(&self) -> &PropertyCache {
        &self.cache
    }

    /// Run the whole pipeline once
    pub(crate) fn discover(&self) -> Result<DnsServerSet> {
        let mut attempted = 0;
        let mut failures = Vec::new();

        if let Some(observer) = &self.observer {
            attempted += 1;
            match structured_lookup(observer.as_ref()) {
                Ok(servers) if !servers.is_empty() => {
                    debug!("Structured lookup found {}", servers);
                    return Ok(servers);
                }
                Ok(_) => debug!("Structured lookup found nothing"),
                Err(e) => {
                    warn!("Structured DNS lookup failed: {}", e);
                    failures.push(format!("structured lookup: {e}"));
                }
            }
        }

        let mut servers = DnsServerSet::new();

        if let Some(store) = &self.properties {
            attempted += 1;
            servers.union_with(&self.probe_properties(store.as_ref()));
        }

        if let Some(enumerator) = &self.interfaces {
            attempted += 1;
            match enumerator.interfaces() {
                Ok(interfaces) => {
                    for interface in interfaces.iter().filter(|i| i.is_candidate()) {
                        debug!("Interface {} resolvers: {:?}", interface.name, interface.dns_servers);
                        servers.extend_raw(&interface.dns_servers);
                    }
                }
                Err(e) => {
                    warn!("Interface enumeration failed: {}", e);
                    failures.push(format!("interface enumeration: {e}"));
                }
            }
        }

        if attempted > 0 && failures.len() == attempted {
            return Err(Error::discovery(format!(
                "All DNS discovery strategies failed: {}",
                failures.join("; ")
            )));
        }

        Ok(servers)
    }

    /// Property probe through the cache
    ///
    /// Lookup failures are negative-cached by [`PropertyCache`], so this
    /// strategy never fails as a whole.
    fn probe_properties(&self, store: &dyn PropertyStore) -> DnsServerSet {
        let mut servers = DnsServerSet::new();

        for key in &self.generic_keys {
            if let Some(value) = self.cache.get_or_load(store, key) {
                servers.insert_raw(&value);
            }
        }
        if !servers.is_empty() {
            debug!("Generic DNS properties found {}", servers);
            return servers;
        }

        for keys in &self.interface_keys {
            let Some(primary) = self
                .cache
                .get_or_load(store, &keys.primary)
                .and_then(|value| parse_literal_ip(&value))
            else {
                continue;
            };
            servers.insert(primary);

            if let Some(secondary) = keys
                .secondary
                .as_deref()
                .and_then(|key| self.cache.get_or_load(store, key))
            {
                servers.insert_raw(&secondary);
            }
            debug!(
                "DNS properties of {} ({}) found {}",
                keys.interface, keys.transport, servers
            );
            break;
        }

        servers
    }
}

fn structured_lookup(observer: &dyn NetworkObserver) -> Result<DnsServerSet> {
    Ok(observer
        .active_network_info()?
        .and_then(|info| info.link_properties)
        .map(|link_properties| link_properties.dns_set())
        .unwrap_or_default())
}
