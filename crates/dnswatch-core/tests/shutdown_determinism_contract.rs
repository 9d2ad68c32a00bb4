//! Contract Test: Shutdown Determinism
//!
//! This test verifies that stopping or dropping a monitor releases
//! everything it acquired.
//!
//! Constraints verified:
//! - `stop()` unregisters the network callback and is idempotent
//! - Dropping a running monitor behaves like `stop()`
//! - Events delivered after stop are ignored
//! - A stopped monitor can be started again from a clean state
//!
//! If this test fails, someone has changed:
//! - Subscription bookkeeping in `start()`/`stop()`
//! - `Drop` implementations of the monitors

mod common;

use common::*;
use dnswatch_core::network::{NetworkEvent, NetworkId};
use dnswatch_core::{EventDrivenDnsMonitor, EventMonitorConfig, PlatformSources, PolledDnsMonitor, PolledMonitorConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

#[tokio::test]
async fn event_driven_stop_releases_subscription() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    let monitor = EventDrivenDnsMonitor::new(observer.clone(), &EventMonitorConfig::default());
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener(listener.clone());

    assert_ok!(monitor.start());
    assert_ok!(monitor.start());
    assert_eq!(observer.register_calls(), 1);
    assert_eq!(observer.active_registrations(), 1);

    monitor.stop();
    monitor.stop();
    assert_eq!(observer.unregister_calls(), 1);
    assert_eq!(observer.active_registrations(), 0);
    assert!(!monitor.is_monitoring());
    assert!(monitor.current_dns_servers().is_empty());
    assert_eq!(monitor.current_network(), None);

    listener.clear();
    observer.emit(NetworkEvent::Available(NetworkId::new(1)));
    assert!(listener.events().is_empty());
}

#[tokio::test]
async fn event_driven_restart_begins_clean() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    let monitor = EventDrivenDnsMonitor::new(observer.clone(), &EventMonitorConfig::default());

    assert_ok!(monitor.start());
    monitor.stop();
    observer.set_networks(vec![cellular(2, &["10.0.0.1"])]);
    assert_ok!(monitor.start());

    assert_eq!(monitor.current_network(), Some(NetworkId::new(2)));
    assert_eq!(monitor.current_dns_servers(), dns(&["10.0.0.1"]));
    assert_eq!(observer.active_registrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn event_driven_stop_cancels_pending_recheck() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    let monitor = EventDrivenDnsMonitor::new(observer.clone(), &EventMonitorConfig::default());
    assert_ok!(monitor.start());

    observer.set_networks(vec![wifi(2, &["1.1.1.1"])]);
    observer.emit(NetworkEvent::Lost(NetworkId::new(1)));
    let snapshots = observer.snapshot_calls();
    monitor.stop();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(observer.snapshot_calls(), snapshots);
}

#[tokio::test]
async fn event_driven_drop_releases_subscription() {
    let observer = Arc::new(ScriptedObserver::new());
    {
        let monitor = EventDrivenDnsMonitor::new(observer.clone(), &EventMonitorConfig::default());
        assert_ok!(monitor.start());
        assert_eq!(observer.active_registrations(), 1);
    }
    assert_eq!(observer.active_registrations(), 0);
}

#[tokio::test]
async fn polled_stop_releases_subscription_and_loop() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());

    assert_ok!(monitor.start());
    assert_ok!(monitor.start());
    assert_eq!(observer.register_calls(), 1);
    assert!(wait_until(|| !listener.dns_changes().is_empty()).await);

    monitor.stop();
    monitor.stop();
    assert_eq!(observer.active_registrations(), 0);
    assert_eq!(observer.unregister_calls(), 1);

    let status = monitor.status();
    assert!(!status.running);
    assert!(status.dns_servers.is_empty());
    assert_eq!(status.cache_entries, 0);

    let snapshots = observer.snapshot_calls();
    monitor.refresh_dns();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(observer.snapshot_calls(), snapshots);
}

#[tokio::test]
async fn polled_drop_releases_subscription() {
    let observer = Arc::new(ScriptedObserver::new());
    {
        let monitor = PolledDnsMonitor::new(
            &PolledMonitorConfig::default(),
            PlatformSources::new().with_observer(observer.clone()),
        );
        assert_ok!(monitor.start());
        assert_eq!(observer.active_registrations(), 1);
    }
    assert_eq!(observer.active_registrations(), 0);
}
