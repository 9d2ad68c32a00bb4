//! Test doubles and common utilities for monitor contract tests
//!
//! Doubles are deliberately small: a scripted observer the test drives by
//! hand, listeners that record what they receive, and a property store that
//! records which keys were consulted.

#![allow(dead_code)]

use dnswatch_core::error::{Error, Result};
use dnswatch_core::network::{
    CapabilitySet, LinkProperties, NetworkEvent, NetworkId, NetworkInfo, NetworkKind, Transport,
};
use dnswatch_core::store::MemoryPropertyStore;
use dnswatch_core::traits::{
    DnsChange, DnsChangeListener, NetworkCallback, NetworkDnsListener, NetworkObserver,
    ObserverHandle, PropertyStore,
};
use dnswatch_core::DnsServerSet;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Network observer driven by the test
///
/// `emit()` invokes every registered callback synchronously on the calling
/// thread, the way a platform delivery thread would.
#[derive(Default)]
pub struct ScriptedObserver {
    networks: Mutex<Vec<NetworkInfo>>,
    active: Mutex<Option<NetworkId>>,
    callbacks: Mutex<BTreeMap<u64, NetworkCallback>>,
    next_handle: AtomicU64,
    fail_registration: AtomicBool,
    fail_snapshot: AtomicBool,
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl ScriptedObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the known networks; the first one becomes active
    pub fn set_networks(&self, networks: Vec<NetworkInfo>) {
        *self.active.lock().unwrap() = networks.first().map(|info| info.id);
        *self.networks.lock().unwrap() = networks;
    }

    pub fn set_active(&self, active: Option<NetworkId>) {
        *self.active.lock().unwrap() = active;
    }

    pub fn fail_registration(&self, fail: bool) {
        self.fail_registration.store(fail, Ordering::SeqCst);
    }

    pub fn fail_snapshot(&self, fail: bool) {
        self.fail_snapshot.store(fail, Ordering::SeqCst);
    }

    /// Deliver an event to every registered callback
    pub fn emit(&self, event: NetworkEvent) {
        let callbacks: Vec<NetworkCallback> =
            self.callbacks.lock().unwrap().values().cloned().collect();
        for callback in callbacks {
            callback(event.clone());
        }
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }

    pub fn active_registrations(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

impl NetworkObserver for ScriptedObserver {
    fn register(&self, callback: NetworkCallback) -> Result<ObserverHandle> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(Error::registration("permission denied"));
        }
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().unwrap().insert(raw, callback);
        Ok(ObserverHandle::new(raw))
    }

    fn unregister(&self, handle: ObserverHandle) -> Result<()> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().unwrap().remove(&handle.as_u64());
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<NetworkInfo>> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(Error::observer("snapshot unavailable"));
        }
        Ok(self.networks.lock().unwrap().clone())
    }

    fn active_network(&self) -> Result<Option<NetworkId>> {
        Ok(*self.active.lock().unwrap())
    }
}

/// Observer whose single WiFi network reports different DNS on every snapshot
#[derive(Default)]
pub struct RotatingObserver {
    calls: AtomicU64,
    callbacks: Mutex<Vec<NetworkCallback>>,
}

impl RotatingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: NetworkEvent) {
        let callbacks = self.callbacks.lock().unwrap().clone();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}

impl NetworkObserver for RotatingObserver {
    fn register(&self, callback: NetworkCallback) -> Result<ObserverHandle> {
        self.callbacks.lock().unwrap().push(callback);
        Ok(ObserverHandle::new(1))
    }

    fn unregister(&self, _handle: ObserverHandle) -> Result<()> {
        self.callbacks.lock().unwrap().clear();
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<NetworkInfo>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let dns = format!("10.0.{}.{}", n / 256, n % 256);
        Ok(vec![wifi(1, &[dns.as_str()])])
    }

    fn active_network(&self) -> Result<Option<NetworkId>> {
        Ok(Some(NetworkId::new(1)))
    }
}

pub fn network(id: u64, transports: &[Transport], dns: &[&str]) -> NetworkInfo {
    NetworkInfo::new(
        NetworkId::new(id),
        CapabilitySet::of(transports),
        Some(LinkProperties::with_dns(dns.iter().copied()).interface(format!("if{id}"))),
    )
}

pub fn wifi(id: u64, dns: &[&str]) -> NetworkInfo {
    network(id, &[Transport::Wifi], dns)
}

pub fn cellular(id: u64, dns: &[&str]) -> NetworkInfo {
    network(id, &[Transport::Cellular], dns)
}

pub fn vpn(id: u64, dns: &[&str]) -> NetworkInfo {
    network(id, &[Transport::Vpn], dns)
}

pub fn link_changed(id: u64, dns: &[&str]) -> NetworkEvent {
    NetworkEvent::LinkPropertiesChanged(NetworkId::new(id), LinkProperties::with_dns(dns.iter().copied()))
}

pub fn dns(servers: &[&str]) -> DnsServerSet {
    DnsServerSet::from_raw(servers)
}

/// What a [`RecordingListener`] received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Available(NetworkId, NetworkKind),
    DnsChanged {
        old: Vec<String>,
        new: Vec<String>,
    },
    Lost(NetworkId),
    Error(String),
}

impl Recorded {
    pub fn dns_changed(old: &[&str], new: &[&str]) -> Self {
        Recorded::DnsChanged {
            old: old.iter().map(|s| s.to_string()).collect(),
            new: new.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Listener recording every callback of either monitor
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Recorded>>,
    dns_change_times: Mutex<Vec<tokio::time::Instant>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn dns_changes(&self) -> Vec<Recorded> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, Recorded::DnsChanged { .. }))
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn dns_change_times(&self) -> Vec<tokio::time::Instant> {
        self.dns_change_times.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
        self.dns_change_times.lock().unwrap().clear();
    }

    fn record_dns(&self, old: &DnsServerSet, new: &DnsServerSet) {
        self.dns_change_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.events.lock().unwrap().push(Recorded::DnsChanged {
            old: old.to_strings(),
            new: new.to_strings(),
        });
    }
}

impl NetworkDnsListener for RecordingListener {
    fn on_dns_changed(&self, change: &DnsChange) {
        self.record_dns(&change.old, &change.new);
    }

    fn on_network_available(&self, network: NetworkId, kind: NetworkKind) {
        self.events.lock().unwrap().push(Recorded::Available(network, kind));
    }

    fn on_network_lost(&self, network: NetworkId) {
        self.events.lock().unwrap().push(Recorded::Lost(network));
    }
}

impl DnsChangeListener for RecordingListener {
    fn on_dns_changed(&self, old: &DnsServerSet, new: &DnsServerSet) {
        self.record_dns(old, new);
    }

    fn on_dns_error(&self, message: &str) {
        self.events.lock().unwrap().push(Recorded::Error(message.to_string()));
    }
}

/// Listener that panics on every callback
pub struct PanickingListener;

impl NetworkDnsListener for PanickingListener {
    fn on_dns_changed(&self, _change: &DnsChange) {
        panic!("listener failure");
    }

    fn on_network_available(&self, _network: NetworkId, _kind: NetworkKind) {
        panic!("listener failure");
    }
}

impl DnsChangeListener for PanickingListener {
    fn on_dns_changed(&self, _old: &DnsServerSet, _new: &DnsServerSet) {
        panic!("listener failure");
    }
}

/// Property store recording every key it is asked for
#[derive(Default)]
pub struct CountingPropertyStore {
    values: MemoryPropertyStore,
    queried: Mutex<Vec<String>>,
}

impl CountingPropertyStore {
    pub fn with_values(values: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (key, value) in values {
            store.values.set(*key, *value);
        }
        store
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

impl PropertyStore for CountingPropertyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.queried.lock().unwrap().push(key.to_string());
        self.values.get(key)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Poll `condition` until it holds, sleeping between attempts
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
