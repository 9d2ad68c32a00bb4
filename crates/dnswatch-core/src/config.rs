//! Configuration types for dnswatch
//!
//! All structures deserialize with per-field defaults, so an empty JSON
//! object `{}` is a complete, valid configuration.

use ip_network::IpNetwork;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::network::Transport;

/// Top-level dnswatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Event-driven monitor settings
    #[serde(default)]
    pub event: EventMonitorConfig,

    /// Polled monitor settings
    #[serde(default)]
    pub polled: PolledMonitorConfig,

    /// Property store chain, tried in order
    #[serde(default)]
    pub property_stores: Vec<PropertyStoreConfig>,
}

impl WatchConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.event.validate()?;
        self.polled.validate()?;
        for store in &self.property_stores {
            store.validate()?;
        }
        Ok(())
    }
}

/// Event-driven monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMonitorConfig {
    /// Delay before re-checking for a replacement network after a loss
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,

    /// Address block of the VPN tunnel's synthetic DNS servers
    ///
    /// A discovered DNS set lying entirely inside this block is treated as
    /// masked and never overwrites the real upstream DNS.
    #[serde(default = "default_masked_dns_block")]
    pub masked_dns_block: IpNetwork,
}

impl EventMonitorConfig {
    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.recheck_delay_ms == 0 {
            return Err(crate::Error::config("event.recheck_delay_ms must be > 0"));
        }
        Ok(())
    }
}

impl Default for EventMonitorConfig {
    fn default() -> Self {
        Self {
            recheck_delay_ms: default_recheck_delay_ms(),
            masked_dns_block: default_masked_dns_block(),
        }
    }
}

/// Polled monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolledMonitorConfig {
    /// Interval in NORMAL mode (seconds)
    #[serde(default = "default_normal_interval_secs")]
    pub normal_interval_secs: u64,

    /// Interval in FAST mode (seconds)
    #[serde(default = "default_fast_interval_secs")]
    pub fast_interval_secs: u64,

    /// Consecutive FAST checks before reverting to NORMAL
    #[serde(default = "default_max_fast_checks")]
    pub max_fast_checks: u32,

    /// Generic DNS property keys, checked first
    #[serde(default = "default_generic_property_keys")]
    pub generic_property_keys: Vec<String>,

    /// Per-interface DNS property keys, in priority order
    #[serde(default = "default_interface_property_keys")]
    pub interface_property_keys: Vec<InterfacePropertyKeys>,
}

/// Longest polling interval accepted by [`PolledMonitorConfig::validate()`]
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

impl PolledMonitorConfig {
    pub fn normal_interval(&self) -> Duration {
        Duration::from_secs(self.normal_interval_secs)
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.fast_interval_secs)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.normal_interval_secs == 0 {
            return Err(crate::Error::config("polled.normal_interval_secs must be > 0"));
        }
        if self.fast_interval_secs == 0 {
            return Err(crate::Error::config("polled.fast_interval_secs must be > 0"));
        }
        if self.normal_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(crate::Error::config(format!(
                "polled.normal_interval_secs must be at most {MAX_POLL_INTERVAL_SECS}"
            )));
        }
        if self.fast_interval_secs > self.normal_interval_secs {
            return Err(crate::Error::config(
                "polled.fast_interval_secs cannot exceed polled.normal_interval_secs",
            ));
        }
        if self.max_fast_checks == 0 {
            return Err(crate::Error::config("polled.max_fast_checks must be > 0"));
        }
        for keys in &self.interface_property_keys {
            if keys.primary.is_empty() {
                return Err(crate::Error::config(format!(
                    "Empty primary property key for interface {}",
                    keys.interface
                )));
            }
        }
        Ok(())
    }
}

impl Default for PolledMonitorConfig {
    fn default() -> Self {
        Self {
            normal_interval_secs: default_normal_interval_secs(),
            fast_interval_secs: default_fast_interval_secs(),
            max_fast_checks: default_max_fast_checks(),
            generic_property_keys: default_generic_property_keys(),
            interface_property_keys: default_interface_property_keys(),
        }
    }
}

/// DNS property keys of one interface
///
/// The secondary key is only consulted once the primary key produced a hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfacePropertyKeys {
    /// Interface name, for logging
    pub interface: String,
    /// Transport the interface belongs to
    pub transport: Transport,
    pub primary: String,
    #[serde(default)]
    pub secondary: Option<String>,
}

impl InterfacePropertyKeys {
    pub fn new(
        interface: impl Into<String>,
        transport: Transport,
        primary: impl Into<String>,
        secondary: Option<&str>,
    ) -> Self {
        Self {
            interface: interface.into(),
            transport,
            primary: primary.into(),
            secondary: secondary.map(str::to_string),
        }
    }

    fn dhcp(interface: &str, transport: Transport) -> Self {
        Self::new(
            interface,
            transport,
            format!("dhcp.{interface}.dns1"),
            Some(&format!("dhcp.{interface}.dns2")),
        )
    }
}

/// Property store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyStoreConfig {
    /// `getprop` command-backed store
    Getprop {
        /// Path to the getprop binary
        #[serde(default = "default_getprop_command")]
        command: String,
    },

    /// `key=value` property file
    File {
        /// Path to the property file
        path: String,
    },

    /// In-memory store with fixed values
    Memory {
        #[serde(default)]
        values: std::collections::HashMap<String, String>,
    },

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl PropertyStoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            PropertyStoreConfig::Getprop { command } => {
                if command.is_empty() {
                    return Err(crate::Error::config("getprop command cannot be empty"));
                }
                Ok(())
            }
            PropertyStoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("Property file path cannot be empty"));
                }
                Ok(())
            }
            PropertyStoreConfig::Memory { .. } => Ok(()),
            PropertyStoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom property store factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the store type name used for registry lookup
    pub fn type_name(&self) -> &str {
        match self {
            PropertyStoreConfig::Getprop { .. } => "getprop",
            PropertyStoreConfig::File { .. } => "file",
            PropertyStoreConfig::Memory { .. } => "memory",
            PropertyStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

fn default_recheck_delay_ms() -> u64 {
    2000
}

fn default_masked_dns_block() -> IpNetwork {
    IpNetwork::V4(
        ip_network::Ipv4Network::new(std::net::Ipv4Addr::new(192, 18, 0, 0), 16)
            .unwrap_or_else(|_| unreachable!("192.18.0.0/16 is a valid network")),
    )
}

fn default_normal_interval_secs() -> u64 {
    60
}

fn default_fast_interval_secs() -> u64 {
    10
}

fn default_max_fast_checks() -> u32 {
    3
}

fn default_generic_property_keys() -> Vec<String> {
    (1..=4).map(|n| format!("net.dns{n}")).collect()
}

fn default_interface_property_keys() -> Vec<InterfacePropertyKeys> {
    vec![
        InterfacePropertyKeys::dhcp("wlan0", Transport::Wifi),
        InterfacePropertyKeys::dhcp("rmnet0", Transport::Cellular),
        InterfacePropertyKeys::dhcp("rmnet_data0", Transport::Cellular),
        InterfacePropertyKeys::dhcp("eth0", Transport::Ethernet),
        InterfacePropertyKeys::new("vpn", Transport::Vpn, "net.vpn.dns1", Some("net.vpn.dns2")),
    ]
}

fn default_getprop_command() -> String {
    "getprop".to_string()
}
