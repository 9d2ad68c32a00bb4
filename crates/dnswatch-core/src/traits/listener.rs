// # Listener Traits
//
// Subscribers of the two monitors. Listeners are invoked synchronously
// from the monitor's dispatch, one after another in registration order.
// A listener that panics is logged and skipped; the others still receive
// the event.

use serde::Serialize;

use crate::dns::DnsServerSet;
use crate::network::{LinkProperties, NetworkId, NetworkKind};

/// DNS change reported by the event-driven monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsChange {
    /// Network the new servers belong to, `None` after a loss
    pub network: Option<NetworkId>,
    pub kind: NetworkKind,
    pub old: DnsServerSet,
    pub new: DnsServerSet,
    /// Link properties that carried the change, when the change came from an event
    pub link_properties: Option<LinkProperties>,
}

/// Listener of the event-driven monitor
pub trait NetworkDnsListener: Send + Sync {
    fn on_dns_changed(&self, change: &DnsChange);

    fn on_network_available(&self, _network: NetworkId, _kind: NetworkKind) {}

    fn on_network_lost(&self, _network: NetworkId) {}
}

/// Listener of the polled monitor
pub trait DnsChangeListener: Send + Sync {
    fn on_dns_changed(&self, old: &DnsServerSet, new: &DnsServerSet);

    /// Registration or discovery failure; the monitor keeps running
    fn on_dns_error(&self, _message: &str) {}
}
