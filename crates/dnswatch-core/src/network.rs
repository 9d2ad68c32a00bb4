//! Network data model
//!
//! Types describing networks as reported by a [`NetworkObserver`](crate::traits::NetworkObserver):
//! identities, transport capabilities, link properties and the events delivered
//! when any of them change.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dns::DnsServerSet;

/// Opaque handle naming one OS-level network
///
/// Unique per network instance. Once the network is lost the handle is dead;
/// a reconnect produces a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(u64);

impl NetworkId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net#{}", self.0)
    }
}

/// Underlying medium of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Wifi,
    Cellular,
    Ethernet,
    Vpn,
}

impl Transport {
    const ALL: [Transport; 4] = [
        Transport::Wifi,
        Transport::Cellular,
        Transport::Ethernet,
        Transport::Vpn,
    ];

    const fn bit(self) -> u8 {
        match self {
            Transport::Wifi => 1,
            Transport::Cellular => 1 << 1,
            Transport::Ethernet => 1 << 2,
            Transport::Vpn => 1 << 3,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Transport::Wifi => "WiFi",
            Transport::Cellular => "Cellular",
            Transport::Ethernet => "Ethernet",
            Transport::Vpn => "VPN",
        };
        f.write_str(label)
    }
}

/// Set of transport flags exposed by one network
///
/// A VPN running over WiFi typically exposes both `Vpn` and `Wifi`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(transports: &[Transport]) -> Self {
        transports
            .iter()
            .fold(Self::empty(), |set, transport| set.with(*transport))
    }

    #[must_use]
    pub const fn with(self, transport: Transport) -> Self {
        Self(self.0 | transport.bit())
    }

    pub const fn has(self, transport: Transport) -> bool {
        self.0 & transport.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Transport> {
        Transport::ALL.into_iter().filter(move |t| self.has(*t))
    }

    /// True for the physical networks the underlying-network heuristic prefers
    pub const fn is_wifi_or_cellular(self) -> bool {
        self.has(Transport::Wifi) || self.has(Transport::Cellular)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.iter().map(|t| t.to_string()).collect();
        if labels.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&labels.join(", "))
        }
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let transports = Vec::<Transport>::deserialize(deserializer)?;
        Ok(Self::of(&transports))
    }
}

/// Human-facing label for a network, derived from its capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Wifi,
    Cellular,
    Ethernet,
    Vpn,
    Unknown,
}

impl NetworkKind {
    /// Picks the most specific label: WiFi, then cellular, ethernet, VPN.
    pub fn from_capabilities(capabilities: CapabilitySet) -> Self {
        if capabilities.has(Transport::Wifi) {
            NetworkKind::Wifi
        } else if capabilities.has(Transport::Cellular) {
            NetworkKind::Cellular
        } else if capabilities.has(Transport::Ethernet) {
            NetworkKind::Ethernet
        } else if capabilities.has(Transport::Vpn) {
            NetworkKind::Vpn
        } else {
            NetworkKind::Unknown
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NetworkKind::Wifi => "WiFi",
            NetworkKind::Cellular => "Cellular",
            NetworkKind::Ethernet => "Ethernet",
            NetworkKind::Vpn => "VPN",
            NetworkKind::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// One route of a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub gateway: Option<String>,
}

/// DNS servers, interface name, routes and addresses associated with one network
///
/// DNS entries are raw strings as reported by the platform; they are only
/// trusted after passing through [`DnsServerSet::from_raw`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProperties {
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub domains: Option<String>,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl LinkProperties {
    pub fn with_dns<I, S>(dns_servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dns_servers: dns_servers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interface_name = Some(name.into());
        self
    }

    /// Validated, deduplicated DNS servers of this link
    pub fn dns_set(&self) -> DnsServerSet {
        DnsServerSet::from_raw(&self.dns_servers)
    }
}

/// One entry of a network snapshot as delivered by the observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: NetworkId,
    pub capabilities: CapabilitySet,
    pub link_properties: Option<LinkProperties>,
}

impl NetworkInfo {
    pub fn new(
        id: NetworkId,
        capabilities: CapabilitySet,
        link_properties: Option<LinkProperties>,
    ) -> Self {
        Self {
            id,
            capabilities,
            link_properties,
        }
    }

    pub fn kind(&self) -> NetworkKind {
        NetworkKind::from_capabilities(self.capabilities)
    }
}

/// Network-state callback delivered by a [`NetworkObserver`](crate::traits::NetworkObserver)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A network became available
    Available(NetworkId),
    /// DNS servers, routes or addresses of a network changed
    LinkPropertiesChanged(NetworkId, LinkProperties),
    /// Transport capabilities of a network changed
    CapabilitiesChanged(NetworkId, CapabilitySet),
    /// A network disappeared; its identity is now dead
    Lost(NetworkId),
}

impl NetworkEvent {
    pub fn network(&self) -> NetworkId {
        match self {
            NetworkEvent::Available(id)
            | NetworkEvent::LinkPropertiesChanged(id, _)
            | NetworkEvent::CapabilitiesChanged(id, _)
            | NetworkEvent::Lost(id) => *id,
        }
    }
}

/// Discovered view of one network, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSnapshot {
    pub identity: NetworkId,
    pub capabilities: CapabilitySet,
    pub dns_servers: DnsServerSet,
    pub interface_name: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_flags() {
        let caps = CapabilitySet::of(&[Transport::Vpn, Transport::Wifi]);
        assert!(caps.has(Transport::Vpn));
        assert!(caps.has(Transport::Wifi));
        assert!(!caps.has(Transport::Cellular));
        assert!(caps.is_wifi_or_cellular());
        assert_eq!(caps.to_string(), "WiFi, VPN");
        assert!(CapabilitySet::empty().is_empty());
    }

    #[test]
    fn network_kind_prefers_physical_transport() {
        let caps = CapabilitySet::of(&[Transport::Vpn, Transport::Cellular]);
        assert_eq!(NetworkKind::from_capabilities(caps), NetworkKind::Cellular);
        assert_eq!(
            NetworkKind::from_capabilities(CapabilitySet::of(&[Transport::Vpn])),
            NetworkKind::Vpn
        );
        assert_eq!(
            NetworkKind::from_capabilities(CapabilitySet::empty()),
            NetworkKind::Unknown
        );
    }

    #[test]
    fn capability_set_serializes_as_list() {
        let caps = CapabilitySet::of(&[Transport::Ethernet]);
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, r#"["ethernet"]"#);
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, caps);
    }
}
