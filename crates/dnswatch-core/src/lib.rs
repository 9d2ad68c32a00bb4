// # dnswatch-core
//
// Core library for observing the DNS servers of a device's real network
// while a local VPN tunnel masks them.
//
// ## Architecture Overview
//
// - **NetworkObserver**: Platform network-state subscription and snapshots
// - **PropertyStore**: OS network property lookup, chained and cached
// - **EventDrivenDnsMonitor**: Reacts to network callbacks, VPN-masking aware
// - **PolledDnsMonitor**: Adaptive-interval heuristic discovery
// - **ChangeNotifier**: Listener fan-out with per-listener panic isolation
// - **StoreRegistry**: Plugin-based registry for property stores
//
// ## Design Principles
//
// 1. **Observe only**: Nothing here resolves names or configures DNS
// 2. **Library-first**: Monitors are plain values owned by the embedding application
// 3. **Plugin-based**: Host integrations live in their own crates behind traits
// 4. **Failure isolation**: Discovery and listener failures never reach the caller

pub mod cache;
pub mod config;
pub mod dns;
pub mod error;
pub mod monitor;
pub mod network;
pub mod notifier;
pub mod registry;
pub mod store;
pub mod stream;
pub mod traits;

// Re-export core types for convenience
pub use config::{EventMonitorConfig, PolledMonitorConfig, PropertyStoreConfig, WatchConfig};
pub use dns::DnsServerSet;
pub use error::{Error, Result};
pub use monitor::{EventDrivenDnsMonitor, MonitorStatus, PlatformSources, PollMode, PolledDnsMonitor};
pub use network::{CapabilitySet, LinkProperties, NetworkEvent, NetworkId, NetworkInfo, NetworkKind, Transport};
pub use registry::StoreRegistry;
pub use store::{ChainedPropertyStore, FilePropertyStore, MemoryPropertyStore};
pub use traits::{
    CarrierInfoProvider, DnsChange, DnsChangeListener, InterfaceEnumerator, NetworkDnsListener,
    NetworkObserver, PropertyStore,
};
