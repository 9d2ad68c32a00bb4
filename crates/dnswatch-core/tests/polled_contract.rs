//! Contract Test: Polled DNS Monitor
//!
//! This test verifies the adaptive polling schedule and the discovery
//! fallback order of the polled monitor.
//!
//! Constraints verified:
//! - A network event switches to FAST polling; after `max_fast_checks`
//!   consecutive FAST checks the monitor reverts to NORMAL
//! - Property keys are consulted in fixed priority order and the interface
//!   scan stops at the first hit
//! - `refresh_dns()` bypasses the interval guard
//! - Losing a network clears the DNS set
//! - A failed event subscription is reported and polling continues
//! - Power saving pins the monitor to NORMAL
//! - Oversized intervals never stop the loop; sub-second ones are raised
//!   to one second
//!
//! If this test fails, someone has changed:
//! - The polling loop schedule
//! - The discovery pipeline order
//! - Event trigger handling

mod common;

use common::*;
use dnswatch_core::network::{NetworkEvent, NetworkId};
use dnswatch_core::traits::{CarrierInfoProvider, RadioTechnology};
use dnswatch_core::{PlatformSources, PollMode, PolledDnsMonitor, PolledMonitorConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn secs_between(earlier: tokio::time::Instant, later: tokio::time::Instant) -> f64 {
    later.duration_since(earlier).as_secs_f64()
}

#[tokio::test(start_paused = true)]
async fn network_event_switches_to_fast_then_back_to_normal() {
    let observer = Arc::new(RotatingObserver::new());
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| listener.dns_changes().len() == 1).await);
    observer.emit(NetworkEvent::Available(NetworkId::new(1)));
    assert_eq!(monitor.status().mode, PollMode::Fast);

    tokio::time::sleep(Duration::from_secs(100)).await;

    let times = listener.dns_change_times();
    assert_eq!(times.len(), 5, "expected checks at 0, 10, 20, 30 and 90 s");
    let gaps: Vec<f64> = times.windows(2).map(|w| secs_between(w[0], w[1])).collect();
    for (gap, expected) in gaps.iter().zip([10.0, 10.0, 10.0, 60.0]) {
        assert!(
            (gap - expected).abs() < 1.0,
            "gap {gap:.2}s, expected {expected}s (all gaps: {gaps:?})"
        );
    }
    assert_eq!(monitor.status().mode, PollMode::Normal);
}

#[tokio::test(start_paused = true)]
async fn repeated_triggers_do_not_shorten_the_interval() {
    let observer = Arc::new(RotatingObserver::new());
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| listener.dns_changes().len() == 1).await);
    for _ in 0..5 {
        observer.emit(NetworkEvent::Available(NetworkId::new(1)));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert_eq!(listener.dns_changes().len(), 1);
    assert!(wait_until(|| listener.dns_changes().len() == 2).await);
    let times = listener.dns_change_times();
    assert!((secs_between(times[0], times[1]) - 10.0).abs() < 1.0);
}

#[tokio::test]
async fn property_keys_are_consulted_in_priority_order() {
    let store = Arc::new(CountingPropertyStore::with_values(&[
        ("dhcp.wlan0.dns1", "192.168.1.1"),
        ("dhcp.wlan0.dns2", "192.168.1.2"),
        ("dhcp.rmnet0.dns1", "10.0.0.1"),
    ]));
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_properties(store.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| !listener.dns_changes().is_empty()).await);

    assert_eq!(
        store.queried(),
        vec![
            "net.dns1",
            "net.dns2",
            "net.dns3",
            "net.dns4",
            "dhcp.wlan0.dns1",
            "dhcp.wlan0.dns2",
        ]
    );
    assert_eq!(
        monitor.current_dns_servers(),
        dns(&["192.168.1.1", "192.168.1.2"])
    );
}

#[tokio::test]
async fn generic_keys_short_circuit_the_interface_scan() {
    let store = Arc::new(CountingPropertyStore::with_values(&[
        ("net.dns1", "8.8.8.8"),
        ("dhcp.wlan0.dns1", "192.168.1.1"),
    ]));
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_properties(store.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| !listener.dns_changes().is_empty()).await);

    assert!(!store.queried().iter().any(|key| key.starts_with("dhcp.")));
    assert_eq!(monitor.current_dns_servers(), dns(&["8.8.8.8"]));
}

#[tokio::test(start_paused = true)]
async fn refresh_bypasses_the_interval_guard() {
    let observer = Arc::new(RotatingObserver::new());
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| listener.dns_changes().len() == 1).await);
    monitor.refresh_dns();
    assert!(wait_until(|| listener.dns_changes().len() == 2).await);

    let times = listener.dns_change_times();
    assert!(secs_between(times[0], times[1]) < 5.0);
}

#[tokio::test]
async fn lost_network_clears_dns() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["8.8.8.8"])]);
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| listener.dns_changes().len() == 1).await);
    observer.set_networks(vec![]);
    observer.emit(NetworkEvent::Lost(NetworkId::new(1)));

    assert_eq!(
        listener.dns_changes(),
        vec![
            Recorded::dns_changed(&[], &["8.8.8.8"]),
            Recorded::dns_changed(&["8.8.8.8"], &[]),
        ]
    );
    assert!(monitor.current_dns_servers().is_empty());
}

#[tokio::test]
async fn failed_subscription_is_reported_and_polling_continues() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.fail_registration(true);
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());

    assert_ok!(monitor.start());
    assert!(monitor.is_running());
    assert_eq!(listener.errors().len(), 1);
    assert!(listener.errors()[0].contains("register"));

    assert!(wait_until(|| !monitor.current_dns_servers().is_empty()).await);
    assert_eq!(monitor.current_dns_servers(), dns(&["223.5.5.5"]));
}

#[tokio::test]
async fn failed_check_is_reported_as_error() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    observer.fail_snapshot(true);
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| !listener.errors().is_empty()).await);
    assert!(listener.dns_changes().is_empty());
    assert!(monitor.current_dns_servers().is_empty());
}

#[tokio::test]
async fn power_saving_keeps_normal_mode() {
    let observer = Arc::new(ScriptedObserver::new());
    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new().with_observer(observer.clone()),
    );
    monitor.set_power_saving_mode(true);
    assert_ok!(monitor.start());

    observer.emit(NetworkEvent::Available(NetworkId::new(1)));

    let status = monitor.status();
    assert!(status.power_saving);
    assert_eq!(status.mode, PollMode::Normal);
    assert_eq!(status.fast_checks, 0);
}

#[tokio::test]
async fn duplicate_listener_key_is_rejected() {
    let monitor = PolledDnsMonitor::new(&PolledMonitorConfig::default(), PlatformSources::new());
    assert!(monitor.add_listener("ui", Arc::new(RecordingListener::new())));
    assert!(!monitor.add_listener("ui", Arc::new(RecordingListener::new())));
    assert!(monitor.remove_listener("ui"));
    assert!(!monitor.remove_listener("ui"));
}

struct StaticCarrier;

impl CarrierInfoProvider for StaticCarrier {
    fn active_operator_name(&self) -> Result<Option<String>> {
        Ok(Some("Example Mobile".to_string()))
    }

    fn active_radio_technology(&self) -> Result<Option<RadioTechnology>> {
        Ok(Some(RadioTechnology::Lte))
    }

    fn wifi_ssid(&self) -> Result<Option<String>> {
        Ok(Some("home".to_string()))
    }
}

#[test]
fn carrier_info_describes_active_connection() {
    let observer = Arc::new(ScriptedObserver::new());
    let monitor = PolledDnsMonitor::new(
        &PolledMonitorConfig::default(),
        PlatformSources::new()
            .with_observer(observer.clone())
            .with_carrier(Arc::new(StaticCarrier)),
    );

    observer.set_networks(vec![wifi(1, &["223.5.5.5"])]);
    assert_eq!(monitor.carrier_info(), "WiFi (SSID: home) [interface: if1]");

    observer.set_networks(vec![cellular(2, &["10.0.0.1"])]);
    assert_eq!(
        monitor.carrier_info(),
        "Cellular (Example Mobile 4G) [interface: if2]"
    );

    observer.set_networks(vec![]);
    assert_eq!(monitor.carrier_info(), dnswatch_core::monitor::UNKNOWN_CARRIER);
}

#[tokio::test(start_paused = true)]
async fn oversized_interval_keeps_the_loop_alive() {
    let observer = Arc::new(RotatingObserver::new());
    let config = PolledMonitorConfig {
        normal_interval_secs: u64::MAX,
        ..PolledMonitorConfig::default()
    };
    let monitor = PolledDnsMonitor::new(&config, PlatformSources::new().with_observer(observer.clone()));
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| listener.dns_changes().len() == 1).await);
    tokio::time::sleep(Duration::from_secs(30)).await;

    monitor.refresh_dns();
    assert!(wait_until(|| listener.dns_changes().len() == 2).await);
    assert!(monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn zero_intervals_are_raised_to_one_second() {
    let observer = Arc::new(RotatingObserver::new());
    let config = PolledMonitorConfig {
        normal_interval_secs: 0,
        fast_interval_secs: 0,
        ..PolledMonitorConfig::default()
    };
    let monitor = PolledDnsMonitor::new(&config, PlatformSources::new().with_observer(observer.clone()));
    let listener = Arc::new(RecordingListener::new());
    monitor.add_listener("recorder", listener.clone());
    assert_ok!(monitor.start());

    assert!(wait_until(|| listener.dns_changes().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(5500)).await;

    let checks = listener.dns_changes().len();
    assert!((5..=8).contains(&checks), "expected one check per second, got {checks}");
}
