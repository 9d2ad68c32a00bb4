// # Network Observer Trait
//
// Defines the interface to the platform's network-state service.
//
// ## Implementations
//
// - sysfs/resolv.conf (Linux): `dnswatch-linux` crate
// - Scripted doubles in the contract tests
//
// ## Delivery
//
// Callbacks arrive on an observer-owned context. The observer serializes
// individual events, but that context may differ from the thread that
// registered the callback.

use std::sync::Arc;

use crate::error::Result;
use crate::network::{NetworkEvent, NetworkId, NetworkInfo};

/// Callback invoked for every network event
pub type NetworkCallback = Arc<dyn Fn(NetworkEvent) + Send + Sync>;

/// Registration handle returned by [`NetworkObserver::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

impl ObserverHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Trait for network observers
///
/// # Blocking
///
/// `snapshot()` and `active_network()` may perform I/O. Monitors call them
/// outside their state locks, and from `spawn_blocking` when running on
/// the tokio runtime.
pub trait NetworkObserver: Send + Sync {
    /// Subscribe to network events
    ///
    /// # Returns
    ///
    /// - `Ok(ObserverHandle)`: Handle to pass to [`unregister`](Self::unregister)
    /// - `Err(Error::Registration)`: If the platform refused the subscription
    fn register(&self, callback: NetworkCallback) -> Result<ObserverHandle>;

    /// Cancel a subscription
    ///
    /// Unregistering an unknown handle is not an error.
    fn unregister(&self, handle: ObserverHandle) -> Result<()>;

    /// All networks currently known to the platform
    fn snapshot(&self) -> Result<Vec<NetworkInfo>>;

    /// The network the platform routes traffic through by default
    ///
    /// With a VPN up this is usually the VPN itself.
    fn active_network(&self) -> Result<Option<NetworkId>>;

    /// Snapshot entry of the active network, if any
    fn active_network_info(&self) -> Result<Option<NetworkInfo>> {
        let Some(active) = self.active_network()? else {
            return Ok(None);
        };
        Ok(self.snapshot()?.into_iter().find(|info| info.id == active))
    }
}
