//! Resolver and routing sources: `resolvectl dns`, `/etc/resolv.conf` and
//! `/proc/net/route`

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use dnswatch_core::network::Route;
use dnswatch_core::{Error, Result};

/// Resolvers reported by systemd-resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverMap {
    pub global: Vec<IpAddr>,
    /// Keyed by interface name
    pub links: HashMap<String, Vec<IpAddr>>,
}

impl ResolverMap {
    pub fn for_link(&self, name: &str) -> &[IpAddr] {
        self.links.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Run `resolvectl dns` and parse its output
pub fn resolvectl_dns() -> Result<ResolverMap> {
    // There is no machine-readable output for this command
    let output = Command::new("resolvectl")
        .arg("dns")
        .output()
        .map_err(|e| Error::observer(format!("Failed to run `resolvectl dns`: {e}")))?;
    if !output.status.success() {
        return Err(Error::observer("`resolvectl dns` returned non-zero exit code"));
    }
    let output = String::from_utf8(output.stdout)
        .map_err(|_| Error::observer("`resolvectl` output was not UTF-8"))?;
    Ok(parse_resolvectl_output(&output))
}

/// Parse the text output of `resolvectl dns`
///
/// Cannot fail. Unrecognized lines and words are skipped.
pub fn parse_resolvectl_output(s: &str) -> ResolverMap {
    let mut map = ResolverMap::default();
    for line in s.lines() {
        let Some((label, servers)) = line.split_once(':').filter(|(label, _)| {
            label.trim_start().starts_with("Global") || label.trim_start().starts_with("Link")
        }) else {
            continue;
        };
        let servers: Vec<IpAddr> = servers
            .split_whitespace()
            .filter_map(|word| IpAddr::from_str(word.split('%').next().unwrap_or(word)).ok())
            .collect();

        let label = label.trim();
        if label == "Global" {
            map.global.extend(servers);
        } else if let Some(name) = label
            .split_once('(')
            .and_then(|(_, rest)| rest.strip_suffix(')'))
        {
            map.links.entry(name.to_string()).or_default().extend(servers);
        }
    }
    map
}

/// Nameservers listed in a `resolv.conf` file
pub fn resolv_conf_nameservers(path: &Path) -> Result<Vec<IpAddr>> {
    let contents = fs::read(path)
        .map_err(|e| Error::observer(format!("Failed to read {}: {}", path.display(), e)))?;
    let parsed = resolv_conf::Config::parse(contents)
        .map_err(|e| Error::observer(format!("Failed to parse {}: {}", path.display(), e)))?;

    // The scope of link-local IPv6 servers is dropped
    Ok(parsed.nameservers.into_iter().map(IpAddr::from).collect())
}

/// One IPv4 route from `/proc/net/route`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub interface: String,
    pub destination: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub metric: u32,
}

impl RouteEntry {
    pub fn is_default(&self) -> bool {
        self.destination.is_unspecified() && self.mask.is_unspecified()
    }

    pub fn to_route(&self) -> Route {
        let prefix = u32::from(self.mask).count_ones();
        Route {
            destination: format!("{}/{}", self.destination, prefix),
            gateway: (!self.gateway.is_unspecified()).then(|| self.gateway.to_string()),
        }
    }
}

pub fn read_routes(path: &Path) -> Result<Vec<RouteEntry>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::observer(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(parse_proc_routes(&contents))
}

/// Parse `/proc/net/route`; malformed rows are skipped
pub fn parse_proc_routes(s: &str) -> Vec<RouteEntry> {
    s.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 8 {
                return None;
            }
            Some(RouteEntry {
                interface: fields[0].to_string(),
                destination: parse_hex_addr(fields[1])?,
                gateway: parse_hex_addr(fields[2])?,
                metric: fields[6].parse().ok()?,
                mask: parse_hex_addr(fields[7])?,
            })
        })
        .collect()
}

/// Interface carrying the default route with the lowest metric
pub fn default_route_interface(routes: &[RouteEntry]) -> Option<&str> {
    routes
        .iter()
        .filter(|route| route.is_default())
        .min_by_key(|route| route.metric)
        .map(|route| route.interface.as_str())
}

/// Addresses in `/proc/net/route` are hex in host (little-endian) byte order
fn parse_hex_addr(hex: &str) -> Option<Ipv4Addr> {
    let raw = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(raw.to_le_bytes()))
}
