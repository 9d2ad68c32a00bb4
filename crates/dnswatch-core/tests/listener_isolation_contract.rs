//! Contract Test: Listener Isolation
//!
//! This test verifies that a failing listener never affects other listeners
//! or the monitor that notifies it.
//!
//! Constraints verified:
//! - Listeners after a panicking listener still receive the notification
//! - The monitor keeps its state and keeps monitoring after the panic
//!
//! If this test fails, someone has changed:
//! - `ChangeNotifier::dispatch` panic containment
//! - Listener dispatch moving inside a state lock

mod common;

use common::*;
use dnswatch_core::network::{NetworkEvent, NetworkId};
use dnswatch_core::{EventDrivenDnsMonitor, EventMonitorConfig, PlatformSources, PolledDnsMonitor, PolledMonitorConfig};
use std::sync::Arc;
use tokio_test::assert_ok;

#[tokio::test]
async fn event_driven_monitor_isolates_panicking_listener() {
    let observer = Arc::new(ScriptedObserver::new());
    let monitor = EventDrivenDnsMonitor::new(observer.clone(), &EventMonitorConfig::default());
    let before = Arc::new(RecordingListener::new());
    let after = Arc::new(RecordingListener::new());
    monitor.add_listener(before.clone());
    monitor.add_listener(Arc::new(PanickingListener));
    monitor.add_listener(after.clone());
    assert_ok!(monitor.start());

    observer.emit(NetworkEvent::LinkPropertiesChanged(
        NetworkId::new(1),
        dnswatch_core::LinkProperties::with_dns(["8.8.8.8"]),
    ));
    observer.set_networks(vec![wifi(2, &["1.1.1.1"])]);
    observer.emit(NetworkEvent::Available(NetworkId::new(2)));

    let expected = vec![
        Recorded::dns_changed(&[], &["8.8.8.8"]),
        Recorded::dns_changed(&["8.8.8.8"], &["1.1.1.1"]),
        Recorded::Available(NetworkId::new(2), dnswatch_core::NetworkKind::Wifi),
    ];
    assert_eq!(before.events(), expected);
    assert_eq!(after.events(), expected);
    assert!(monitor.is_monitoring());
    assert_eq!(monitor.current_dns_servers(), dns(&["1.1.1.1"]));
}

#[tokio::test]
async fn polled_monitor_isolates_panicking_listener() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let before = Arc::new(RecordingListener::new());
    let after = Arc::new(RecordingListener::new());
    monitor.add_listener("a-before", before.clone());
    monitor.add_listener("b-panics", Arc::new(PanickingListener));
    monitor.add_listener("c-after", after.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| !after.dns_changes().is_empty()).await);
    assert_eq!(before.dns_changes(), vec![Recorded::dns_changed(&[], &["223.5.5.5"])]);
    assert_eq!(after.dns_changes(), vec![Recorded::dns_changed(&[], &["223.5.5.5"])]);

    observer.set_networks(vec![]);
    observer.emit(NetworkEvent::Lost(NetworkId::new(1)));
    assert_eq!(after.dns_changes().len(), 2);
    assert!(monitor.is_running());
}
