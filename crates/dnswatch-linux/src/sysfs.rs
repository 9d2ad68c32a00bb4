//! Link enumeration from `/sys/class/net`

use std::fs;
use std::path::{Path, PathBuf};

use dnswatch_core::network::{CapabilitySet, Transport};
use dnswatch_core::{Error, Result};
use tracing::trace;

const IFF_UP: u32 = 0x1;
const IFF_LOOPBACK: u32 = 0x8;
const ARPHRD_ETHER: u32 = 1;
const ARPHRD_LOOPBACK: u32 = 772;

/// Name prefixes of virtual links that never carry the device's own DNS
const IGNORED_PREFIXES: &[&str] = &["veth", "docker", "br-", "virbr", "lxcbr", "cni", "flannel"];

const VPN_PREFIXES: &[&str] = &["tun", "tap", "wg", "ppp", "utun", "ipsec"];
const CELLULAR_PREFIXES: &[&str] = &["wwan", "rmnet", "ccmni", "usb"];
const WIFI_PREFIXES: &[&str] = &["wl"];
const ETHERNET_PREFIXES: &[&str] = &["eth", "en"];

/// One link as seen in sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub name: String,
    pub index: u64,
    pub is_up: bool,
    pub is_loopback: bool,
    /// Bridges and container plumbing
    pub is_virtual: bool,
    pub transport: Option<Transport>,
    pub mtu: Option<u32>,
}

impl LinkEntry {
    pub fn capabilities(&self) -> CapabilitySet {
        self.transport
            .map(|transport| CapabilitySet::of(&[transport]))
            .unwrap_or_default()
    }

    /// True if the link may be reported as a network
    pub fn is_observable(&self) -> bool {
        self.is_up && !self.is_loopback && !self.is_virtual
    }
}

/// Read every link under `net_dir`, sorted by interface index
pub fn read_links(net_dir: &Path) -> Result<Vec<LinkEntry>> {
    let entries = fs::read_dir(net_dir).map_err(|e| {
        Error::observer(format!("Failed to read {}: {}", net_dir.display(), e))
    })?;

    let mut links = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match read_link(&entry.path(), name) {
            Some(link) => links.push(link),
            None => trace!("Skipping unreadable link {}", entry.path().display()),
        }
    }
    links.sort_by_key(|link| link.index);
    Ok(links)
}

fn read_link(dir: &Path, name: String) -> Option<LinkEntry> {
    let index = read_number(&dir.join("ifindex"))?;
    let flags = read_hex(&dir.join("flags")).unwrap_or(0);
    let link_type = read_number(&dir.join("type")).map(|t| t as u32);
    let operstate = read_trimmed(&dir.join("operstate")).unwrap_or_default();

    let is_loopback = flags & IFF_LOOPBACK != 0 || link_type == Some(ARPHRD_LOOPBACK);
    let is_up = flags & IFF_UP != 0 && operstate != "down";
    let is_virtual = dir.join("bridge").exists()
        || IGNORED_PREFIXES.iter().any(|prefix| name.starts_with(prefix));
    let transport = classify(dir, &name, link_type);
    let mtu = read_number(&dir.join("mtu")).and_then(|mtu| u32::try_from(mtu).ok());

    Some(LinkEntry {
        name,
        index,
        is_up,
        is_loopback,
        is_virtual,
        transport,
        mtu,
    })
}

/// Transport of a link: sysfs markers first, then the name
fn classify(dir: &Path, name: &str, link_type: Option<u32>) -> Option<Transport> {
    if dir.join("wireless").exists() || dir.join("phy80211").exists() {
        return Some(Transport::Wifi);
    }
    if dir.join("tun_flags").exists() {
        return Some(Transport::Vpn);
    }

    let has_prefix = |prefixes: &[&str]| prefixes.iter().any(|prefix| name.starts_with(prefix));
    if has_prefix(VPN_PREFIXES) {
        Some(Transport::Vpn)
    } else if has_prefix(CELLULAR_PREFIXES) {
        Some(Transport::Cellular)
    } else if has_prefix(WIFI_PREFIXES) {
        Some(Transport::Wifi)
    } else if has_prefix(ETHERNET_PREFIXES) || link_type == Some(ARPHRD_ETHER) {
        Some(Transport::Ethernet)
    } else {
        None
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_number(path: &Path) -> Option<u64> {
    read_trimmed(path)?.parse().ok()
}

fn read_hex(path: &Path) -> Option<u32> {
    let raw = read_trimmed(path)?;
    u32::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

/// Default location of the link directory
pub fn default_net_dir() -> PathBuf {
    PathBuf::from("/sys/class/net")
}
