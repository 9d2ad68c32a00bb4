//! Linux network observer
//!
//! Builds [`NetworkInfo`]s from sysfs, the resolver configuration and the
//! routing table. Linux has no callback API a plain process can rely on
//! everywhere, so changes are detected by diffing snapshots on an interval
//! and delivered as [`NetworkEvent`]s.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dnswatch_core::network::{LinkProperties, NetworkEvent, NetworkId, NetworkInfo};
use dnswatch_core::traits::{InterfaceEnumerator, InterfaceInfo, NetworkCallback, NetworkObserver, ObserverHandle};
use dnswatch_core::{Error, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::resolvers::{self, ResolverMap, RouteEntry};
use crate::sysfs::{self, LinkEntry};

/// Default interval between snapshot diffs
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Host paths read by the observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub net_dir: PathBuf,
    pub route_table: PathBuf,
    pub resolv_conf: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            net_dir: sysfs::default_net_dir(),
            route_table: PathBuf::from("/proc/net/route"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
        }
    }
}

/// Reads the host state; shared by the observer and the enumerator
#[derive(Debug, Clone)]
pub(crate) struct HostReader {
    paths: HostPaths,
    use_resolvectl: bool,
    /// Global resolvers a link last saw while it held the default route
    remembered: Arc<Mutex<HashMap<String, Vec<IpAddr>>>>,
}

/// Raw host state of one snapshot
pub(crate) struct HostState {
    pub links: Vec<LinkEntry>,
    pub resolvers: ResolverMap,
    pub routes: Vec<RouteEntry>,
}

impl HostReader {
    fn new(paths: HostPaths) -> Self {
        Self {
            paths,
            use_resolvectl: true,
            remembered: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn read(&self) -> Result<HostState> {
        let links = sysfs::read_links(&self.paths.net_dir)?;

        let resolvers = if self.use_resolvectl {
            resolvers::resolvectl_dns().unwrap_or_else(|e| {
                trace!("Per-link resolvers unavailable: {}", e);
                ResolverMap::default()
            })
        } else {
            ResolverMap::default()
        };

        let routes = resolvers::read_routes(&self.paths.route_table).unwrap_or_else(|e| {
            debug!("Routing table unavailable: {}", e);
            Vec::new()
        });

        Ok(HostState {
            links,
            resolvers,
            routes,
        })
    }

    /// Resolvers of the default-route link when it has none of its own
    fn global_resolvers(&self, state: &HostState) -> Vec<IpAddr> {
        if !state.resolvers.global.is_empty() {
            return state.resolvers.global.clone();
        }
        resolvers::resolv_conf_nameservers(&self.paths.resolv_conf)
            .map(|servers| servers.into_iter().filter(|ip| !ip.is_loopback()).collect())
            .unwrap_or_else(|e| {
                debug!("Global resolvers unavailable: {}", e);
                Vec::new()
            })
    }

    /// Observable networks and the one holding the default route
    ///
    /// A link without per-link resolvers gets the global ones while it holds
    /// the default route and keeps them after losing it, so a VPN taking the
    /// default route does not empty the DNS of the link beneath it.
    pub(crate) fn networks(&self) -> Result<(Vec<NetworkInfo>, Option<NetworkId>)> {
        let state = self.read()?;
        let default_link = resolvers::default_route_interface(&state.routes).map(str::to_string);
        let global = match &default_link {
            Some(name) if state.resolvers.for_link(name).is_empty() => self.global_resolvers(&state),
            _ => Vec::new(),
        };

        let mut remembered = self.remembered.lock().unwrap_or_else(PoisonError::into_inner);
        remembered.retain(|name, _| {
            state
                .links
                .iter()
                .any(|link| link.is_observable() && &link.name == name)
        });

        let mut networks = Vec::new();
        let mut active = None;
        for link in state.links.iter().filter(|link| link.is_observable()) {
            let is_default = default_link.as_deref() == Some(link.name.as_str());
            let mut dns: Vec<IpAddr> = state.resolvers.for_link(&link.name).to_vec();
            if dns.is_empty() {
                if is_default && !global.is_empty() {
                    dns = global.clone();
                    remembered.insert(link.name.clone(), global.clone());
                } else if let Some(known) = remembered.get(&link.name) {
                    trace!("Keeping last known resolvers of {}", link.name);
                    dns = known.clone();
                }
            }

            let link_properties = LinkProperties {
                dns_servers: dns.iter().map(IpAddr::to_string).collect(),
                interface_name: Some(link.name.clone()),
                domains: None,
                mtu: link.mtu,
                routes: state
                    .routes
                    .iter()
                    .filter(|route| route.interface == link.name)
                    .map(RouteEntry::to_route)
                    .collect(),
                addresses: Vec::new(),
            };
            let id = NetworkId::new(link.index);
            if is_default {
                active = Some(id);
            }
            networks.push(NetworkInfo::new(id, link.capabilities(), Some(link_properties)));
        }

        Ok((networks, active))
    }
}

/// Events turning `previous` into `current`
///
/// New networks yield `Available`, then `CapabilitiesChanged` and
/// `LinkPropertiesChanged`; vanished networks yield `Lost`.
pub fn diff_snapshots(previous: &[NetworkInfo], current: &[NetworkInfo]) -> Vec<NetworkEvent> {
    let before: HashMap<NetworkId, &NetworkInfo> =
        previous.iter().map(|info| (info.id, info)).collect();
    let after: HashMap<NetworkId, &NetworkInfo> =
        current.iter().map(|info| (info.id, info)).collect();

    let mut events = Vec::new();
    for info in current {
        match before.get(&info.id) {
            None => {
                events.push(NetworkEvent::Available(info.id));
                events.push(NetworkEvent::CapabilitiesChanged(info.id, info.capabilities));
                if let Some(link_properties) = &info.link_properties {
                    events.push(NetworkEvent::LinkPropertiesChanged(info.id, link_properties.clone()));
                }
            }
            Some(old) => {
                if old.capabilities != info.capabilities {
                    events.push(NetworkEvent::CapabilitiesChanged(info.id, info.capabilities));
                }
                if old.link_properties != info.link_properties {
                    if let Some(link_properties) = &info.link_properties {
                        events.push(NetworkEvent::LinkPropertiesChanged(info.id, link_properties.clone()));
                    }
                }
            }
        }
    }
    for info in previous {
        if !after.contains_key(&info.id) {
            events.push(NetworkEvent::Lost(info.id));
        }
    }
    events
}

#[derive(Default)]
struct WatchState {
    callbacks: BTreeMap<u64, NetworkCallback>,
    task: Option<JoinHandle<()>>,
}

/// [`NetworkObserver`] over sysfs, systemd-resolved and the routing table
///
/// The first `register()` starts a background diff task on the current
/// tokio runtime; the last `unregister()` stops it. Callbacks are invoked
/// on the blocking pool, one batch of events at a time.
pub struct LinuxNetworkObserver {
    reader: HostReader,
    poll_interval: Duration,
    watch: Arc<Mutex<WatchState>>,
    next_handle: AtomicU64,
}

impl LinuxNetworkObserver {
    pub fn new() -> Self {
        Self {
            reader: HostReader::new(HostPaths::default()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch: Arc::new(Mutex::new(WatchState::default())),
            next_handle: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_paths(mut self, paths: HostPaths) -> Self {
        self.reader.paths = paths;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Only read `resolv.conf`, never run `resolvectl`
    #[must_use]
    pub fn without_resolvectl(mut self) -> Self {
        self.reader.use_resolvectl = false;
        self
    }

    /// Interface enumerator reading the same host sources
    pub fn interface_enumerator(&self) -> SysfsInterfaceEnumerator {
        SysfsInterfaceEnumerator {
            reader: self.reader.clone(),
        }
    }

    fn lock_watch(&self) -> MutexGuard<'_, WatchState> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_watcher(&self, runtime: &Handle, baseline: Vec<NetworkInfo>) -> JoinHandle<()> {
        let reader = self.reader.clone();
        let watch = Arc::downgrade(&self.watch);
        let period = self.poll_interval;

        runtime.spawn(async move {
            let mut previous = baseline;
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                let reader = reader.clone();
                let current = match tokio::task::spawn_blocking(move || reader.networks()).await {
                    Ok(Ok((networks, _))) => networks,
                    Ok(Err(e)) => {
                        warn!("Failed to read network state: {}", e);
                        continue;
                    }
                    Err(e) => {
                        warn!("Network state task failed: {}", e);
                        continue;
                    }
                };

                let events = diff_snapshots(&previous, &current);
                previous = current;
                if events.is_empty() {
                    continue;
                }

                let Some(shared) = watch.upgrade() else {
                    break;
                };
                let callbacks: Vec<NetworkCallback> = shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .callbacks
                    .values()
                    .cloned()
                    .collect();
                drop(shared);

                // Callbacks may run discovery, which reads sysfs and spawns `resolvectl`
                let delivery = tokio::task::spawn_blocking(move || {
                    for event in events {
                        trace!("Delivering {:?}", event);
                        for callback in &callbacks {
                            callback(event.clone());
                        }
                    }
                });
                if let Err(e) = delivery.await {
                    warn!("Network event delivery failed: {}", e);
                }
            }
        })
    }
}

impl Default for LinuxNetworkObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkObserver for LinuxNetworkObserver {
    fn register(&self, callback: NetworkCallback) -> Result<ObserverHandle> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::registration("Linux network observer requires a tokio runtime"))?;

        let mut watch = self.lock_watch();
        if watch.task.is_none() {
            let (baseline, _) = self.reader.networks().map_err(|e| {
                Error::registration(format!("Cannot read initial network state: {e}"))
            })?;
            debug!("Starting network watcher with {} network(s)", baseline.len());
            watch.task = Some(self.spawn_watcher(&runtime, baseline));
        }

        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
        watch.callbacks.insert(raw, callback);
        Ok(ObserverHandle::new(raw))
    }

    fn unregister(&self, handle: ObserverHandle) -> Result<()> {
        let mut watch = self.lock_watch();
        if watch.callbacks.remove(&handle.as_u64()).is_none() {
            return Err(Error::observer(format!("Unknown observer handle {}", handle.as_u64())));
        }
        if watch.callbacks.is_empty() {
            if let Some(task) = watch.task.take() {
                debug!("Last callback removed, stopping network watcher");
                task.abort();
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<NetworkInfo>> {
        Ok(self.reader.networks()?.0)
    }

    fn active_network(&self) -> Result<Option<NetworkId>> {
        Ok(self.reader.networks()?.1)
    }

    fn active_network_info(&self) -> Result<Option<NetworkInfo>> {
        let (networks, active) = self.reader.networks()?;
        Ok(active.and_then(|id| networks.into_iter().find(|info| info.id == id)))
    }
}

impl Drop for LinuxNetworkObserver {
    fn drop(&mut self) {
        if let Some(task) = self.lock_watch().task.take() {
            task.abort();
        }
    }
}

/// [`InterfaceEnumerator`] over sysfs and per-link resolvers
pub struct SysfsInterfaceEnumerator {
    reader: HostReader,
}

impl SysfsInterfaceEnumerator {
    pub fn new(paths: HostPaths) -> Self {
        Self {
            reader: HostReader::new(paths),
        }
    }
}

impl Default for SysfsInterfaceEnumerator {
    fn default() -> Self {
        Self::new(HostPaths::default())
    }
}

impl InterfaceEnumerator for SysfsInterfaceEnumerator {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        let state = self.reader.read()?;
        Ok(state
            .links
            .iter()
            .map(|link| InterfaceInfo {
                name: link.name.clone(),
                is_up: link.is_up,
                is_loopback: link.is_loopback,
                dns_servers: state
                    .resolvers
                    .for_link(&link.name)
                    .iter()
                    .map(IpAddr::to_string)
                    .collect(),
            })
            .collect())
    }
}
