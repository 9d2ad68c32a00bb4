// # Interface Enumerator Trait
//
// Lists local network interfaces. The polled monitor uses it as its weakest
// discovery strategy: only up, non-loopback interfaces with per-link
// resolvers contribute, and an empty result is normal.

use serde::Serialize;

use crate::error::Result;

/// One local network interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub is_up: bool,
    pub is_loopback: bool,
    /// Raw per-link resolver addresses, unvalidated
    pub dns_servers: Vec<String>,
}

impl InterfaceInfo {
    /// True if the interface may contribute DNS servers
    pub fn is_candidate(&self) -> bool {
        self.is_up && !self.is_loopback && !self.dns_servers.is_empty()
    }
}

/// Trait for interface enumerators
pub trait InterfaceEnumerator: Send + Sync {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>>;
}
