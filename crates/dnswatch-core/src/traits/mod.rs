//! Core traits for dnswatch
//!
//! Host integrations the monitors consume, and the listener interfaces they expose.
//!
//! - [`NetworkObserver`]: network-state subscription and snapshots
//! - [`PropertyStore`]: key-value lookup of OS network properties
//! - [`CarrierInfoProvider`]: operator, radio technology and SSID
//! - [`InterfaceEnumerator`]: local interfaces for the weak discovery fallback
//! - [`NetworkDnsListener`] / [`DnsChangeListener`]: change subscribers

pub mod carrier_info;
pub mod interfaces;
pub mod listener;
pub mod network_observer;
pub mod property_store;

pub use carrier_info::{CarrierInfoProvider, RadioTechnology};
pub use interfaces::{InterfaceEnumerator, InterfaceInfo};
pub use listener::{DnsChange, DnsChangeListener, NetworkDnsListener};
pub use network_observer::{NetworkCallback, NetworkObserver, ObserverHandle};
pub use property_store::{PropertyStore, PropertyStoreFactory};
