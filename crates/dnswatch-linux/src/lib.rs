// # Linux Host Integrations
//
// Host side of dnswatch on Linux desktops and servers:
//
// - [`LinuxNetworkObserver`]: networks from `/sys/class/net`, per-link DNS
//   from `resolvectl dns`, global DNS from `/etc/resolv.conf` and the active
//   network from the default route in `/proc/net/route`. Changes are found
//   by diffing snapshots every few seconds.
// - [`SysfsInterfaceEnumerator`]: the weakest discovery strategy of the
//   polled monitor.
// - [`LinuxCarrierInfo`]: WiFi SSID via `iwgetid`.
//
// ## Platform Support
//
// Everything reads plain files and runs plain commands; on hosts without
// them the observer reports errors and the monitors degrade gracefully.

mod carrier;
mod observer;
pub mod resolvers;
pub mod sysfs;

pub use carrier::LinuxCarrierInfo;
pub use observer::{diff_snapshots, HostPaths, LinuxNetworkObserver, SysfsInterfaceEnumerator, DEFAULT_POLL_INTERVAL};
