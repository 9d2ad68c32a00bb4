//! Event-driven DNS monitor
//!
//! Consumes [`NetworkEvent`]s from a [`NetworkObserver`] and keeps track of
//! the current network and the DNS servers of the real, underlying network.
//!
//! ## Event Flow
//!
//! ```text
//! NetworkObserver ── NetworkEvent ──► EventDrivenDnsMonitor ──► ChangeNotifier ──► listeners
//!        ▲                                    │
//!        └──────── snapshot() ◄───────────────┘  (underlying-network heuristic)
//! ```
//!
//! ## VPN Masking
//!
//! While the local tunnel is up, the active network is the VPN and its DNS
//! servers are synthetic addresses inside `masked_dns_block`. Those never
//! overwrite the real DNS set: the heuristic prefers a non-VPN WiFi or
//! cellular network, and a link-properties update whose servers all fall
//! inside the block is ignored.
//!
//! ## Threading
//!
//! Observer callbacks may arrive on any thread. All mutable state sits in
//! one mutex; observer I/O and listener dispatch happen with the mutex
//! released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::EventMonitorConfig;
use crate::dns::{DnsServerSet, VpnMask};
use crate::error::{Error, Result};
use crate::network::{
    CapabilitySet, LinkProperties, NetworkEvent, NetworkId, NetworkInfo, NetworkKind,
    NetworkSnapshot, Transport,
};
use crate::notifier::{pointer_key, ChangeNotifier};
use crate::traits::{DnsChange, NetworkCallback, NetworkDnsListener, NetworkObserver, ObserverHandle};

/// Outcome of the underlying-network heuristic
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selection {
    /// A non-VPN WiFi or cellular network with usable DNS
    Underlying(NetworkInfo, DnsServerSet),
    /// The active network, whose DNS passed the masking test
    Active(NetworkInfo, DnsServerSet),
    /// The active network only exposes masked DNS
    Masked(NetworkId, DnsServerSet),
    /// Nothing usable
    Nothing,
}

impl Selection {
    fn network(&self) -> Option<(&NetworkInfo, &DnsServerSet)> {
        match self {
            Selection::Underlying(info, dns) | Selection::Active(info, dns) => Some((info, dns)),
            Selection::Masked(..) | Selection::Nothing => None,
        }
    }
}

/// Pick the network whose DNS is the device's real upstream DNS
pub(crate) fn select_underlying(
    networks: &[NetworkInfo],
    active: Option<NetworkId>,
    mask: &VpnMask,
) -> Selection {
    let underlying = networks
        .iter()
        .filter(|info| !info.capabilities.has(Transport::Vpn))
        .filter(|info| info.capabilities.is_wifi_or_cellular())
        .find_map(|info| {
            let dns = info.link_properties.as_ref()?.dns_set();
            (!dns.is_empty() && !mask.masks(&dns)).then(|| (info.clone(), dns))
        });
    if let Some((info, dns)) = underlying {
        return Selection::Underlying(info, dns);
    }

    let Some(active) = networks
        .iter()
        .find(|info| Some(info.id) == active)
    else {
        return Selection::Nothing;
    };

    let dns = active
        .link_properties
        .as_ref()
        .map(LinkProperties::dns_set)
        .unwrap_or_default();
    if dns.is_empty() {
        Selection::Nothing
    } else if mask.masks(&dns) {
        Selection::Masked(active.id, dns)
    } else {
        Selection::Active(active.clone(), dns)
    }
}

/// How a discovered candidate network is adopted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adoption {
    /// Keep the current network, only refresh DNS
    DnsOnly,
    /// Adopt the candidate when no network is tracked yet, without announcing it
    SeedSilently,
    /// Adopt a candidate that differs from the current network and announce it
    Announce,
}

#[derive(Default)]
struct MonitorState {
    is_active: bool,
    handle: Option<ObserverHandle>,
    current_network: Option<NetworkId>,
    current_dns: DnsServerSet,
    current_interface: Option<String>,
    capabilities: HashMap<NetworkId, CapabilitySet>,
    recheck: Option<JoinHandle<()>>,
    runtime: Option<Handle>,
}

impl MonitorState {
    fn kind_of(&self, network: Option<NetworkId>) -> NetworkKind {
        network
            .and_then(|id| self.capabilities.get(&id))
            .map(|caps| NetworkKind::from_capabilities(*caps))
            .unwrap_or(NetworkKind::Unknown)
    }
}

struct Inner {
    observer: Arc<dyn NetworkObserver>,
    mask: VpnMask,
    recheck_delay: Duration,
    listeners: ChangeNotifier<usize, dyn NetworkDnsListener>,
    state: Mutex<MonitorState>,
    /// Bumped on every start/stop; callbacks from older registrations are ignored
    session: AtomicU64,
    /// Bumped on every scheduled re-check and on stop
    recheck_generation: AtomicU64,
}

/// DNS monitor driven by network-state callbacks
///
/// ## Lifecycle
///
/// 1. Create with [`EventDrivenDnsMonitor::new()`]
/// 2. Subscribe listeners with [`add_listener()`](Self::add_listener)
/// 3. [`start()`](Self::start) subscribes to the observer
/// 4. [`stop()`](Self::stop) or drop releases the subscription and timers
pub struct EventDrivenDnsMonitor {
    inner: Arc<Inner>,
}

impl EventDrivenDnsMonitor {
    /// Create a new monitor
    ///
    /// # Parameters
    ///
    /// - `observer`: Platform network observer
    /// - `config`: Re-check delay and VPN masking block
    pub fn new(observer: Arc<dyn NetworkObserver>, config: &EventMonitorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                observer,
                mask: VpnMask::new(config.masked_dns_block),
                recheck_delay: config.recheck_delay(),
                listeners: ChangeNotifier::new(),
                state: Mutex::new(MonitorState::default()),
                session: AtomicU64::new(0),
                recheck_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to the observer and seed the DNS state
    ///
    /// When called from within a tokio runtime, that runtime is used for the
    /// delayed re-check after a network loss; otherwise each re-check gets a
    /// short-lived timer thread. Calling `start()` while already monitoring
    /// is a no-op.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Monitoring (or already monitoring)
    /// - `Err(Error::Registration)`: The observer refused the subscription;
    ///   the monitor stays inactive and `start()` may be retried
    pub fn start(&self) -> Result<()> {
        let session = {
            let mut state = self.inner.lock_state();
            if state.is_active {
                debug!("Event-driven DNS monitor already running");
                return Ok(());
            }
            *state = MonitorState::default();
            state.is_active = true;
            state.runtime = Handle::try_current().ok();
            self.inner.session.fetch_add(1, Ordering::SeqCst) + 1
        };

        let weak = Arc::downgrade(&self.inner);
        let callback: NetworkCallback = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(session, event);
            }
        });

        match self.inner.observer.register(callback) {
            Ok(handle) => {
                let mut state = self.inner.lock_state();
                if state.is_active && self.inner.session.load(Ordering::SeqCst) == session {
                    state.handle = Some(handle);
                } else {
                    drop(state);
                    debug!("Monitor stopped during registration, releasing subscription");
                    if let Err(e) = self.inner.observer.unregister(handle) {
                        warn!("Failed to unregister network callback: {}", e);
                    }
                    return Ok(());
                }
            }
            Err(e) => {
                error!("Failed to register network callback: {}", e);
                *self.inner.lock_state() = MonitorState::default();
                return Err(match e {
                    Error::Registration(_) => e,
                    other => Error::registration(other.to_string()),
                });
            }
        }

        info!("Event-driven DNS monitoring started");
        self.inner.discover(Adoption::SeedSilently);
        Ok(())
    }

    /// Unsubscribe, cancel the pending re-check and reset all state
    ///
    /// Idempotent.
    pub fn stop(&self) {
        let (handle, recheck) = {
            let mut state = self.inner.lock_state();
            if !state.is_active {
                return;
            }
            let handle = state.handle.take();
            let recheck = state.recheck.take();
            *state = MonitorState::default();
            (handle, recheck)
        };
        self.inner.session.fetch_add(1, Ordering::SeqCst);
        self.inner.recheck_generation.fetch_add(1, Ordering::SeqCst);

        if let Some(task) = recheck {
            task.abort();
        }
        if let Some(handle) = handle {
            if let Err(e) = self.inner.observer.unregister(handle) {
                warn!("Failed to unregister network callback: {}", e);
            }
        }
        info!("Event-driven DNS monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.lock_state().is_active
    }

    /// Subscribe a listener
    ///
    /// # Returns
    ///
    /// `false` if the same listener was already subscribed
    pub fn add_listener(&self, listener: Arc<dyn NetworkDnsListener>) -> bool {
        self.inner.listeners.add(pointer_key(&listener), listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn NetworkDnsListener>) -> bool {
        self.inner.listeners.remove(&pointer_key(listener))
    }

    /// Current DNS servers of the real network
    pub fn current_dns_servers(&self) -> DnsServerSet {
        self.inner.lock_state().current_dns.clone()
    }

    pub fn current_network(&self) -> Option<NetworkId> {
        self.inner.lock_state().current_network
    }

    /// Snapshot of the tracked network, if any
    pub fn current_snapshot(&self) -> Option<NetworkSnapshot> {
        let state = self.inner.lock_state();
        let identity = state.current_network?;
        Some(NetworkSnapshot {
            identity,
            capabilities: state.capabilities.get(&identity).copied().unwrap_or_default(),
            dns_servers: state.current_dns.clone(),
            interface_name: state.current_interface.clone(),
            timestamp: chrono::Utc::now(),
        })
    }

    /// Re-read the DNS servers of the current network
    ///
    /// Falls back to [`force_check_network_change()`](Self::force_check_network_change)
    /// when no network is tracked or the tracked network has disappeared.
    /// Performs observer I/O on the calling thread.
    pub fn refresh_current_network_dns(&self) {
        if !self.is_monitoring() {
            debug!("Refresh requested while not monitoring");
            return;
        }
        let Some(current) = self.current_network() else {
            self.force_check_network_change();
            return;
        };

        let networks = match self.inner.observer.snapshot() {
            Ok(networks) => networks,
            Err(e) => {
                warn!("Failed to refresh DNS of {}: {}", current, e);
                return;
            }
        };
        self.inner.remember_capabilities(&networks);

        let Some(info) = networks.into_iter().find(|info| info.id == current) else {
            debug!("Current network {} no longer known, re-checking", current);
            self.force_check_network_change();
            return;
        };
        let Some(link_properties) = info.link_properties else {
            debug!("No link properties for {}", current);
            return;
        };
        let dns = link_properties.dns_set();
        if dns.is_empty() || self.inner.mask.masks(&dns) {
            debug!("Ignoring unusable DNS {} on {}", dns, current);
            return;
        }
        self.inner.apply_dns(Some(current), dns, Some(link_properties));
    }

    /// Re-run candidate discovery now
    ///
    /// A candidate network different from the current one is adopted and
    /// announced with `on_network_available` before its DNS is applied.
    /// Performs observer I/O on the calling thread.
    pub fn force_check_network_change(&self) {
        if !self.is_monitoring() {
            debug!("Network check requested while not monitoring");
            return;
        }
        self.inner.discover(Adoption::Announce);
    }

    /// Human-readable diagnostic line
    pub fn monitoring_status(&self) -> String {
        let state = self.inner.lock_state();
        let network = state
            .current_network
            .map(|id| format!("{} ({})", id, state.kind_of(Some(id))))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "EventDrivenDnsMonitor: monitoring={}, network={}, dns={} server(s) {}, listeners={}, recheck_pending={}",
            state.is_active,
            network,
            state.current_dns.len(),
            state.current_dns,
            self.inner.listeners.len(),
            state.recheck.as_ref().is_some_and(|task| !task.is_finished()),
        )
    }
}

impl Drop for EventDrivenDnsMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current_session(&self, session: u64) -> bool {
        self.session.load(Ordering::SeqCst) == session && self.lock_state().is_active
    }

    fn handle_event(self: &Arc<Self>, session: u64, event: NetworkEvent) {
        if !self.is_current_session(session) {
            trace!("Dropping event from stale registration: {:?}", event);
            return;
        }

        match event {
            NetworkEvent::Available(id) => self.on_available(id),
            NetworkEvent::LinkPropertiesChanged(id, link_properties) => {
                self.on_link_properties_changed(id, link_properties)
            }
            NetworkEvent::CapabilitiesChanged(id, capabilities) => {
                self.on_capabilities_changed(id, capabilities)
            }
            NetworkEvent::Lost(id) => self.on_lost(id),
        }
    }

    fn on_available(&self, id: NetworkId) {
        self.lock_state().current_network = Some(id);
        self.discover(Adoption::DnsOnly);

        let kind = self.lock_state().kind_of(Some(id));
        info!("Network available: {} ({})", id, kind);
        self.listeners
            .dispatch("network available", |listener| listener.on_network_available(id, kind));
    }

    fn on_link_properties_changed(&self, id: NetworkId, link_properties: LinkProperties) {
        let dns = link_properties.dns_set();
        if self.mask.masks(&dns) {
            debug!("Ignoring VPN-masked DNS {} on {}", dns, id);
            return;
        }
        if dns.is_empty() && self.lock_state().current_network != Some(id) {
            debug!("Ignoring empty DNS on {}, not the current network", id);
            return;
        }
        self.apply_dns(Some(id), dns, Some(link_properties));
    }

    fn on_capabilities_changed(&self, id: NetworkId, capabilities: CapabilitySet) {
        self.lock_state().capabilities.insert(id, capabilities);
        debug!(
            "Capabilities of {} changed: [{}] ({})",
            id,
            capabilities,
            NetworkKind::from_capabilities(capabilities)
        );
    }

    fn on_lost(self: &Arc<Self>, id: NetworkId) {
        let lost_current = {
            let mut state = self.lock_state();
            let kind = state.kind_of(Some(id));
            state.capabilities.remove(&id);
            if state.current_network == Some(id) {
                state.current_network = None;
                state.current_interface = None;
                let old = std::mem::take(&mut state.current_dns);
                Some((kind, old))
            } else {
                None
            }
        };

        info!("Network lost: {}", id);

        if let Some((kind, old)) = lost_current {
            if !old.is_empty() {
                info!("DNS cleared after loss of {}: {} -> []", id, old);
                let change = DnsChange {
                    network: None,
                    kind,
                    old,
                    new: DnsServerSet::new(),
                    link_properties: None,
                };
                self.listeners
                    .dispatch("dns change", |listener| listener.on_dns_changed(&change));
            }
            self.schedule_recheck();
        }

        self.listeners
            .dispatch("network lost", |listener| listener.on_network_lost(id));
    }

    /// Schedule the delayed re-check, superseding any pending one
    fn schedule_recheck(self: &Arc<Self>) {
        let mut state = self.lock_state();
        if let Some(previous) = state.recheck.take() {
            previous.abort();
        }
        let generation = self.recheck_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.recheck_delay;
        let weak = Arc::downgrade(self);
        debug!("Scheduling network re-check in {:?}", delay);

        let Some(runtime) = state.runtime.clone() else {
            drop(state);
            spawn_recheck_thread(weak, generation, delay);
            return;
        };

        state.recheck = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.recheck_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let result = tokio::task::spawn_blocking(move || inner.run_recheck(generation)).await;
            if let Err(e) = result {
                warn!("Delayed network re-check failed: {}", e);
            }
        }));
    }

    /// Run the re-check if `generation` is still the latest one
    fn run_recheck(&self, generation: u64) {
        if self.recheck_generation.load(Ordering::SeqCst) == generation
            && self.lock_state().is_active
        {
            debug!("Running delayed network re-check");
            self.discover(Adoption::Announce);
        }
    }

    fn remember_capabilities(&self, networks: &[NetworkInfo]) {
        let mut state = self.lock_state();
        for info in networks {
            state.capabilities.insert(info.id, info.capabilities);
        }
    }

    /// Run the underlying-network heuristic and apply its result
    fn discover(&self, adoption: Adoption) {
        let (networks, active) = match self
            .observer
            .snapshot()
            .and_then(|networks| Ok((networks, self.observer.active_network()?)))
        {
            Ok(found) => found,
            Err(e) => {
                warn!("Network discovery failed, keeping current DNS: {}", e);
                return;
            }
        };
        self.remember_capabilities(&networks);

        let selection = select_underlying(&networks, active, &self.mask);
        let Some((candidate, dns)) = selection.network() else {
            match &selection {
                Selection::Masked(id, dns) => {
                    debug!("Active network {} only exposes masked DNS {}", id, dns)
                }
                _ => debug!("No network with usable DNS found"),
            }
            return;
        };
        debug!("Discovered DNS {} on {} ({})", dns, candidate.id, candidate.kind());

        match adoption {
            Adoption::DnsOnly => {}
            Adoption::SeedSilently => {
                let mut state = self.lock_state();
                if state.is_active && state.current_network.is_none() {
                    state.current_network = Some(candidate.id);
                }
            }
            Adoption::Announce => {
                let adopted = {
                    let mut state = self.lock_state();
                    if state.is_active && state.current_network != Some(candidate.id) {
                        state.current_network = Some(candidate.id);
                        true
                    } else {
                        false
                    }
                };
                if adopted {
                    let (id, kind) = (candidate.id, candidate.kind());
                    info!("Switched to network {} ({})", id, kind);
                    self.listeners
                        .dispatch("network available", |listener| listener.on_network_available(id, kind));
                }
            }
        }

        self.apply_dns(
            Some(candidate.id),
            dns.clone(),
            candidate.link_properties.clone(),
        );
    }

    /// Replace the current DNS set if it differs and notify listeners
    fn apply_dns(
        &self,
        network: Option<NetworkId>,
        new: DnsServerSet,
        link_properties: Option<LinkProperties>,
    ) {
        let change = {
            let mut state = self.lock_state();
            if !state.is_active {
                return;
            }
            if state.current_dns == new {
                trace!("DNS unchanged ({}), skipping notification", new);
                return;
            }
            let old = std::mem::replace(&mut state.current_dns, new.clone());
            if let Some(name) = link_properties
                .as_ref()
                .and_then(|lp| lp.interface_name.clone())
            {
                state.current_interface = Some(name);
            }
            DnsChange {
                network,
                kind: state.kind_of(network),
                old,
                new,
                link_properties,
            }
        };

        info!(
            "DNS servers changed on {}: {} -> {}",
            change
                .network
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string()),
            change.old,
            change.new
        );
        if let Some(link_properties) = &change.link_properties {
            log_link_details(change.kind, link_properties);
        }

        self.listeners
            .dispatch("dns change", |listener| listener.on_dns_changed(&change));
    }
}

/// Timer thread for monitors started outside a tokio runtime
///
/// The thread cannot be aborted; a newer generation or `stop()` turns it into
/// a no-op.
fn spawn_recheck_thread(weak: Weak<Inner>, generation: u64, delay: Duration) {
    let spawned = std::thread::Builder::new()
        .name("dnswatch-recheck".to_string())
        .spawn(move || {
            std::thread::sleep(delay);
            if let Some(inner) = weak.upgrade() {
                inner.run_recheck(generation);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn network re-check thread: {}", e);
    }
}

fn log_link_details(kind: NetworkKind, link_properties: &LinkProperties) {
    debug!(
        "Network details ({}): interface={}, domains={}, mtu={}",
        kind,
        link_properties.interface_name.as_deref().unwrap_or("-"),
        link_properties.domains.as_deref().unwrap_or("-"),
        link_properties
            .mtu
            .map(|mtu| mtu.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    for route in &link_properties.routes {
        debug!(
            "  route {} via {}",
            route.destination,
            route.gateway.as_deref().unwrap_or("-")
        );
    }
    for address in &link_properties.addresses {
        debug!("  address {}", address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask() -> VpnMask {
        VpnMask::new("192.18.0.0/16".parse().unwrap())
    }

    fn network(id: u64, transports: &[Transport], dns: &[&str]) -> NetworkInfo {
        NetworkInfo::new(
            NetworkId::new(id),
            CapabilitySet::of(transports),
            Some(LinkProperties::with_dns(dns.iter().copied())),
        )
    }

    #[test]
    fn prefers_physical_network_over_vpn() {
        let networks = vec![
            network(1, &[Transport::Vpn], &["192.18.0.1"]),
            network(2, &[Transport::Wifi], &["223.5.5.5"]),
        ];
        match select_underlying(&networks, Some(NetworkId::new(1)), &mask()) {
            Selection::Underlying(info, dns) => {
                assert_eq!(info.id, NetworkId::new(2));
                assert_eq!(dns.to_strings(), vec!["223.5.5.5"]);
            }
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[test]
    fn vpn_flagged_wifi_is_excluded() {
        let networks = vec![
            network(1, &[Transport::Vpn, Transport::Wifi], &["10.0.0.1"]),
            network(2, &[Transport::Cellular], &["8.8.8.8"]),
        ];
        assert!(matches!(
            select_underlying(&networks, None, &mask()),
            Selection::Underlying(info, _) if info.id == NetworkId::new(2)
        ));
    }

    #[test]
    fn masked_active_network_is_not_accepted() {
        let networks = vec![network(1, &[Transport::Vpn], &["192.18.0.1", "192.18.0.2"])];
        assert!(matches!(
            select_underlying(&networks, Some(NetworkId::new(1)), &mask()),
            Selection::Masked(..)
        ));
    }

    #[test]
    fn unmasked_active_network_is_accepted() {
        let networks = vec![network(1, &[Transport::Ethernet], &["1.1.1.1"])];
        assert!(matches!(
            select_underlying(&networks, Some(NetworkId::new(1)), &mask()),
            Selection::Active(..)
        ));
    }

    #[test]
    fn empty_result_selects_nothing() {
        let networks = vec![network(1, &[Transport::Wifi], &[])];
        assert_eq!(
            select_underlying(&networks, Some(NetworkId::new(1)), &mask()),
            Selection::Nothing
        );
        assert_eq!(select_underlying(&[], None, &mask()), Selection::Nothing);
    }
}
