//! DNS server sets and address validation
//!
//! Every DNS address entering the system goes through [`parse_literal_ip`]:
//! candidates are parsed as literal IP addresses only, never resolved.

use ip_network::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Parse a raw DNS server string as a literal IP address
///
/// Platform APIs sometimes report addresses as `/1.2.3.4` (socket-address
/// formatting) or with an IPv6 zone suffix (`fe80::1%wlan0`). Both are
/// stripped before parsing. Anything that is not a literal address yields
/// `None`.
pub fn parse_literal_ip(raw: &str) -> Option<IpAddr> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let without_zone = match trimmed.split_once('%') {
        Some((addr, _zone)) => addr,
        None => trimmed,
    };
    if without_zone.is_empty() {
        return None;
    }
    without_zone.parse().ok()
}

/// Deduplicated set of DNS server addresses
///
/// Equality is set equality: `[a, b]` equals `[b, a]`. Insertion order is
/// kept so the servers display in the order the platform reported them.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<IpAddr>", into = "Vec<IpAddr>")]
pub struct DnsServerSet {
    servers: Vec<IpAddr>,
}

impl DnsServerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from raw strings, silently dropping entries that are not
    /// literal IP addresses
    pub fn from_raw<S: AsRef<str>>(raw: &[S]) -> Self {
        let mut set = Self::new();
        set.extend_raw(raw);
        set
    }

    pub fn from_addrs<I: IntoIterator<Item = IpAddr>>(addrs: I) -> Self {
        let mut set = Self::new();
        for addr in addrs {
            set.insert(addr);
        }
        set
    }

    /// Insert an address; returns `false` if it was already present
    pub fn insert(&mut self, addr: IpAddr) -> bool {
        if self.servers.contains(&addr) {
            return false;
        }
        self.servers.push(addr);
        true
    }

    /// Insert a raw string after validation; returns `true` if it was added
    pub fn insert_raw(&mut self, raw: &str) -> bool {
        match parse_literal_ip(raw) {
            Some(addr) => self.insert(addr),
            None => {
                tracing::trace!("Dropping invalid DNS entry: {:?}", raw);
                false
            }
        }
    }

    pub fn extend_raw<S: AsRef<str>>(&mut self, raw: &[S]) {
        for entry in raw {
            self.insert_raw(entry.as_ref());
        }
    }

    /// Union with another set, keeping this set's order first
    pub fn union_with(&mut self, other: &DnsServerSet) {
        for addr in &other.servers {
            self.insert(*addr);
        }
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.servers.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.servers.iter()
    }

    /// Addresses rendered as strings, in insertion order
    pub fn to_strings(&self) -> Vec<String> {
        self.servers.iter().map(ToString::to_string).collect()
    }

    /// True if the set is non-empty and every address lies inside `block`
    pub fn is_within(&self, block: &IpNetwork) -> bool {
        !self.servers.is_empty() && self.servers.iter().all(|addr| block.contains(*addr))
    }
}

impl PartialEq for DnsServerSet {
    fn eq(&self, other: &Self) -> bool {
        self.servers.len() == other.servers.len()
            && self.servers.iter().all(|addr| other.contains(addr))
    }
}

impl From<Vec<IpAddr>> for DnsServerSet {
    fn from(addrs: Vec<IpAddr>) -> Self {
        Self::from_addrs(addrs)
    }
}

impl From<DnsServerSet> for Vec<IpAddr> {
    fn from(set: DnsServerSet) -> Self {
        set.servers
    }
}

impl<'a> IntoIterator for &'a DnsServerSet {
    type Item = &'a IpAddr;
    type IntoIter = std::slice::Iter<'a, IpAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.iter()
    }
}

impl fmt::Display for DnsServerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_strings().join(", "))
    }
}

/// Synthetic DNS block used by the local VPN tunnel
///
/// A DNS set lying entirely inside this block is the tunnel's own resolver,
/// not the upstream network's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpnMask {
    block: IpNetwork,
}

impl VpnMask {
    pub fn new(block: IpNetwork) -> Self {
        Self { block }
    }

    pub fn block(&self) -> &IpNetwork {
        &self.block
    }

    /// True if `set` is non-empty and entirely masked
    pub fn masks(&self, set: &DnsServerSet) -> bool {
        set.is_within(&self.block)
    }
}
