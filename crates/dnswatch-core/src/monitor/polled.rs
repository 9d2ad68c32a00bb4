//! Polled DNS monitor with adaptive interval
//!
//! Runs the [`DiscoveryPipeline`](super::discovery) on a background tokio
//! task and reports changes of the discovered DNS set.
//!
//! ## Adaptive Interval
//!
//! ```text
//!            network event (available / link changed / lost)
//!   ┌──────────┐ ───────────────────────────────────────► ┌──────────┐
//!   │  NORMAL  │                                          │   FAST   │
//!   │  (60 s)  │ ◄─────────────────────────────────────── │  (10 s)  │
//!   └──────────┘      max_fast_checks consecutive checks  └──────────┘
//! ```
//!
//! The next check is due one interval after the previous one, whatever the
//! number of triggers in between. Only [`PolledDnsMonitor::refresh_dns()`]
//! runs a check before that. Power saving pins the monitor to NORMAL.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::discovery::DiscoveryPipeline;
use crate::config::PolledMonitorConfig;
use crate::dns::DnsServerSet;
use crate::error::{Error, Result};
use crate::network::{NetworkEvent, NetworkKind};
use crate::notifier::ChangeNotifier;
use crate::traits::{
    CarrierInfoProvider, DnsChangeListener, InterfaceEnumerator, NetworkCallback,
    NetworkObserver, ObserverHandle, PropertyStore,
};

/// Placeholder returned by [`PolledDnsMonitor::carrier_info()`] on failure
pub const UNKNOWN_CARRIER: &str = "unknown";

/// Shortest interval the polling loop accepts
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline used when an interval does not fit into an `Instant`
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

fn at_least_min(name: &str, interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        warn!("{} interval {:?} is too short, using {:?}", name, interval, MIN_INTERVAL);
        MIN_INTERVAL
    } else {
        interval
    }
}

/// Polling mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    Fast,
    #[default]
    Normal,
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollMode::Fast => f.write_str("FAST"),
            PollMode::Normal => f.write_str("NORMAL"),
        }
    }
}

/// Host integrations consulted by the polled monitor
///
/// Every source is optional; missing ones are skipped by the pipeline.
#[derive(Clone, Default)]
pub struct PlatformSources {
    pub observer: Option<Arc<dyn NetworkObserver>>,
    pub properties: Option<Arc<dyn PropertyStore>>,
    pub interfaces: Option<Arc<dyn InterfaceEnumerator>>,
    pub carrier: Option<Arc<dyn CarrierInfoProvider>>,
}

impl PlatformSources {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn NetworkObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Arc<dyn PropertyStore>) -> Self {
        self.properties = Some(properties);
        self
    }

    #[must_use]
    pub fn with_interfaces(mut self, interfaces: Arc<dyn InterfaceEnumerator>) -> Self {
        self.interfaces = Some(interfaces);
        self
    }

    #[must_use]
    pub fn with_carrier(mut self, carrier: Arc<dyn CarrierInfoProvider>) -> Self {
        self.carrier = Some(carrier);
        self
    }
}

/// Structured monitor status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub mode: PollMode,
    pub fast_checks: u32,
    pub listeners: usize,
    pub cache_entries: usize,
    pub dns_servers: Vec<String>,
    pub power_saving: bool,
    /// Seconds since the last completed check started
    pub last_check_secs_ago: Option<u64>,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PolledDnsMonitor: running={}, mode={}, fast_checks={}, listeners={}, cache_entries={}, dns=[{}], power_saving={}",
            self.running,
            self.mode,
            self.fast_checks,
            self.listeners,
            self.cache_entries,
            self.dns_servers.join(", "),
            self.power_saving,
        )?;
        if let Some(secs) = self.last_check_secs_ago {
            write!(f, ", last_check={}s ago", secs)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct PolledState {
    is_active: bool,
    mode: PollMode,
    fast_checks: u32,
    current_dns: DnsServerSet,
    last_check: Option<Instant>,
    /// Explicit refresh pending; bypasses the interval guard once
    force_check: bool,
    /// Previous cycle failed; use the NORMAL interval once
    backoff_once: bool,
    handle: Option<ObserverHandle>,
    task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

struct PolledInner {
    normal_interval: Duration,
    fast_interval: Duration,
    max_fast_checks: u32,
    observer: Option<Arc<dyn NetworkObserver>>,
    carrier: Option<Arc<dyn CarrierInfoProvider>>,
    pipeline: DiscoveryPipeline,
    listeners: ChangeNotifier<String, dyn DnsChangeListener>,
    state: Mutex<PolledState>,
    power_saving: AtomicBool,
    session: AtomicU64,
    wake: Notify,
}

/// DNS monitor polling the discovery pipeline on an adaptive interval
///
/// `start()` must be called from within a tokio runtime; the polling loop
/// and the blocking discovery work run on that runtime.
pub struct PolledDnsMonitor {
    inner: Arc<PolledInner>,
}

impl PolledDnsMonitor {
    /// Create a new monitor
    ///
    /// # Parameters
    ///
    /// - `config`: Intervals and property keys. Callers should run
    ///   [`PolledMonitorConfig::validate()`] first; intervals below one
    ///   second are raised to one second here.
    /// - `sources`: Host integrations used for discovery and carrier info
    pub fn new(config: &PolledMonitorConfig, sources: PlatformSources) -> Self {
        let pipeline = DiscoveryPipeline::new(
            config,
            sources.observer.clone(),
            sources.properties,
            sources.interfaces,
        );
        Self {
            inner: Arc::new(PolledInner {
                normal_interval: at_least_min("NORMAL", config.normal_interval()),
                fast_interval: at_least_min("FAST", config.fast_interval()),
                max_fast_checks: config.max_fast_checks.max(1),
                observer: sources.observer,
                carrier: sources.carrier,
                pipeline,
                listeners: ChangeNotifier::new(),
                state: Mutex::new(PolledState::default()),
                power_saving: AtomicBool::new(false),
                session: AtomicU64::new(0),
                wake: Notify::new(),
            }),
        }
    }

    /// Start the polling loop and subscribe to network events
    ///
    /// A failed subscription is reported through `on_dns_error` and polling
    /// continues without event triggers. Calling `start()` while running is
    /// a no-op.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Running
    /// - `Err(Error::InvalidInput)`: Called outside a tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::invalid_input("PolledDnsMonitor::start must be called within a tokio runtime")
        })?;

        let session = {
            let mut state = self.inner.lock_state();
            if state.is_active {
                debug!("Polled DNS monitor already running");
                return Ok(());
            }
            *state = PolledState::default();
            state.is_active = true;
            let session = self.inner.session.fetch_add(1, Ordering::SeqCst) + 1;

            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            state.shutdown = Some(shutdown_tx);
            state.task = Some(runtime.spawn(Arc::clone(&self.inner).run(shutdown_rx)));
            session
        };

        if self.inner.power_saving.load(Ordering::SeqCst) {
            info!("Polled DNS monitoring started in power saving mode");
        } else {
            info!("Polled DNS monitoring started");
        }

        if let Some(observer) = &self.inner.observer {
            let weak = Arc::downgrade(&self.inner);
            let callback: NetworkCallback = Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_event(session, event);
                }
            });

            match observer.register(callback) {
                Ok(handle) => {
                    let mut state = self.inner.lock_state();
                    if state.is_active && self.inner.session.load(Ordering::SeqCst) == session {
                        state.handle = Some(handle);
                    } else {
                        drop(state);
                        if let Err(e) = observer.unregister(handle) {
                            warn!("Failed to unregister network callback: {}", e);
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to register network callback, polling only: {}", e);
                    self.inner
                        .report_error(&format!("Failed to register network callback: {e}"));
                }
            }
        }

        Ok(())
    }

    /// Stop polling, unsubscribe and reset all state
    ///
    /// Idempotent.
    pub fn stop(&self) {
        let (handle, task, shutdown) = {
            let mut state = self.inner.lock_state();
            if !state.is_active {
                return;
            }
            let handle = state.handle.take();
            let task = state.task.take();
            let shutdown = state.shutdown.take();
            *state = PolledState::default();
            (handle, task, shutdown)
        };
        self.inner.session.fetch_add(1, Ordering::SeqCst);

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        if let Some(task) = task {
            task.abort();
        }
        if let (Some(observer), Some(handle)) = (&self.inner.observer, handle) {
            if let Err(e) = observer.unregister(handle) {
                warn!("Failed to unregister network callback: {}", e);
            }
        }
        self.inner.pipeline.cache().clear();
        info!("Polled DNS monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().is_active
    }

    /// Subscribe a listener under `key`
    ///
    /// # Returns
    ///
    /// `false` if `key` is already taken
    pub fn add_listener(&self, key: impl Into<String>, listener: Arc<dyn DnsChangeListener>) -> bool {
        self.inner.listeners.add(key.into(), listener)
    }

    pub fn remove_listener(&self, key: &str) -> bool {
        self.inner.listeners.remove(&key.to_string())
    }

    pub fn current_dns_servers(&self) -> DnsServerSet {
        self.inner.lock_state().current_dns.clone()
    }

    /// Request an immediate check
    ///
    /// Clears the property cache and bypasses the interval guard once.
    pub fn refresh_dns(&self) {
        {
            let mut state = self.inner.lock_state();
            if !state.is_active {
                debug!("Refresh requested while not running");
                return;
            }
            state.force_check = true;
        }
        self.inner.pipeline.cache().clear();
        debug!("Explicit DNS refresh requested");
        self.inner.wake.notify_one();
    }

    /// Pin the monitor to NORMAL mode while `enabled`
    pub fn set_power_saving_mode(&self, enabled: bool) {
        let previous = self.inner.power_saving.swap(enabled, Ordering::SeqCst);
        if previous == enabled {
            return;
        }
        if enabled {
            let mut state = self.inner.lock_state();
            state.mode = PollMode::Normal;
            state.fast_checks = 0;
        }
        info!("Power saving mode {}", if enabled { "enabled" } else { "disabled" });
        self.inner.wake.notify_one();
    }

    pub fn is_power_saving(&self) -> bool {
        self.inner.power_saving.load(Ordering::SeqCst)
    }

    /// Structured status
    pub fn status(&self) -> MonitorStatus {
        let state = self.inner.lock_state();
        MonitorStatus {
            running: state.is_active,
            mode: state.mode,
            fast_checks: state.fast_checks,
            listeners: self.inner.listeners.len(),
            cache_entries: self.inner.pipeline.cache().len(),
            dns_servers: state.current_dns.to_strings(),
            power_saving: self.inner.power_saving.load(Ordering::SeqCst),
            last_check_secs_ago: state.last_check.map(|at| at.elapsed().as_secs()),
        }
    }

    /// Human-readable diagnostic line
    pub fn monitoring_status(&self) -> String {
        self.status().to_string()
    }

    /// Describe the active connection, e.g. `WiFi (SSID: home) [interface: wlan0]`
    ///
    /// Best-effort and synchronous. Any failure yields [`UNKNOWN_CARRIER`].
    pub fn carrier_info(&self) -> String {
        let described = panic::catch_unwind(AssertUnwindSafe(|| self.inner.describe_connection()));
        match described {
            Ok(Ok(description)) => description,
            Ok(Err(e)) => {
                debug!("Carrier info unavailable: {}", e);
                UNKNOWN_CARRIER.to_string()
            }
            Err(_) => {
                warn!("Carrier info provider panicked");
                UNKNOWN_CARRIER.to_string()
            }
        }
    }
}

impl Drop for PolledDnsMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PolledInner {
    fn lock_state(&self) -> MutexGuard<'_, PolledState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let due = self.next_due();
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.wake.notified() => {
                    trace!("Polling loop woken, recomputing schedule");
                    continue;
                }
                _ = tokio::time::sleep_until(due) => {}
            }
            self.run_cycle().await;
        }
        debug!("Polling loop exited");
    }

    fn current_interval(&self, state: &PolledState) -> Duration {
        if state.backoff_once || self.power_saving.load(Ordering::SeqCst) {
            return self.normal_interval;
        }
        match state.mode {
            PollMode::Fast => self.fast_interval,
            PollMode::Normal => self.normal_interval,
        }
    }

    fn next_due(&self) -> Instant {
        let state = self.lock_state();
        match state.last_check {
            _ if state.force_check => Instant::now(),
            None => Instant::now(),
            Some(last) => last
                .checked_add(self.current_interval(&state))
                .unwrap_or_else(far_future),
        }
    }

    async fn run_cycle(self: &Arc<Self>) {
        {
            let mut state = self.lock_state();
            if !state.is_active {
                return;
            }
            state.force_check = false;
            state.backoff_once = false;
            state.last_check = Some(Instant::now());
        }

        let inner = Arc::clone(self);
        let result = match tokio::task::spawn_blocking(move || inner.pipeline.discover()).await {
            Ok(result) => result,
            Err(e) => Err(Error::discovery(format!("Discovery task failed: {e}"))),
        };

        match result {
            Ok(servers) => self.apply(servers),
            Err(e) => {
                warn!("DNS check failed, backing off to NORMAL interval: {}", e);
                self.lock_state().backoff_once = true;
                self.report_error(&e.to_string());
            }
        }

        let mut state = self.lock_state();
        if state.mode == PollMode::Fast {
            state.fast_checks += 1;
            if state.fast_checks >= self.max_fast_checks {
                debug!("{} consecutive FAST checks, reverting to NORMAL", state.fast_checks);
                state.mode = PollMode::Normal;
                state.fast_checks = 0;
            }
        }
    }

    fn apply(&self, servers: DnsServerSet) {
        let old = {
            let mut state = self.lock_state();
            if !state.is_active {
                return;
            }
            if state.current_dns == servers {
                trace!("DNS unchanged ({})", servers);
                return;
            }
            std::mem::replace(&mut state.current_dns, servers.clone())
        };
        info!("DNS servers changed: {} -> {}", old, servers);
        self.listeners
            .dispatch("dns change", |listener| listener.on_dns_changed(&old, &servers));
    }

    fn report_error(&self, message: &str) {
        self.listeners
            .dispatch("dns error", |listener| listener.on_dns_error(message));
    }

    fn handle_event(&self, session: u64, event: NetworkEvent) {
        if self.session.load(Ordering::SeqCst) != session {
            return;
        }
        match event {
            NetworkEvent::Available(id) => self.trigger(&format!("network {id} available")),
            NetworkEvent::LinkPropertiesChanged(id, _) => {
                self.trigger(&format!("link properties of {id} changed"))
            }
            NetworkEvent::Lost(id) => {
                self.clear_dns();
                self.trigger(&format!("network {id} lost"));
            }
            NetworkEvent::CapabilitiesChanged(id, _) => {
                trace!("Capabilities of {} changed, not a DNS trigger", id)
            }
        }
    }

    /// Switch to FAST mode and invalidate the property cache
    fn trigger(&self, reason: &str) {
        {
            let mut state = self.lock_state();
            if !state.is_active {
                return;
            }
            if !self.power_saving.load(Ordering::SeqCst) {
                state.mode = PollMode::Fast;
            }
            state.fast_checks = 0;
        }
        self.pipeline.cache().clear();
        debug!("Network change ({}), switching to FAST polling", reason);
        self.wake.notify_one();
    }

    fn clear_dns(&self) {
        let old = {
            let mut state = self.lock_state();
            if !state.is_active {
                return;
            }
            std::mem::take(&mut state.current_dns)
        };
        if !old.is_empty() {
            info!("DNS cleared after network loss: {} -> []", old);
            let empty = DnsServerSet::new();
            self.listeners
                .dispatch("dns change", |listener| listener.on_dns_changed(&old, &empty));
        }
    }

    fn describe_connection(&self) -> Result<String> {
        let observer = self
            .observer
            .as_ref()
            .ok_or_else(|| Error::carrier("No network observer configured"))?;
        let info = observer
            .active_network_info()?
            .ok_or_else(|| Error::carrier("No active network"))?;

        let kind = info.kind();
        let mut description = kind.to_string();

        match (kind, &self.carrier) {
            (NetworkKind::Wifi, Some(carrier)) => {
                if let Some(ssid) = carrier.wifi_ssid().unwrap_or_else(|e| {
                    debug!("SSID unavailable: {}", e);
                    None
                }) {
                    description.push_str(&format!(" (SSID: {ssid})"));
                }
            }
            (NetworkKind::Cellular, Some(carrier)) => {
                let mut details = Vec::new();
                match carrier.active_operator_name() {
                    Ok(Some(operator)) => details.push(operator),
                    Ok(None) => {}
                    Err(e) => debug!("Operator name unavailable: {}", e),
                }
                match carrier.active_radio_technology() {
                    Ok(Some(technology)) => details.push(
                        technology
                            .generation()
                            .map(str::to_string)
                            .unwrap_or_else(|| technology.to_string()),
                    ),
                    Ok(None) => {}
                    Err(e) => debug!("Radio technology unavailable: {}", e),
                }
                if !details.is_empty() {
                    description.push_str(&format!(" ({})", details.join(" ")));
                }
            }
            _ => {}
        }

        if let Some(interface) = info
            .link_properties
            .as_ref()
            .and_then(|lp| lp.interface_name.as_deref())
        {
            description.push_str(&format!(" [interface: {interface}]"));
        }

        Ok(description)
    }
}
