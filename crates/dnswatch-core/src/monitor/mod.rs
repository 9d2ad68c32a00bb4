//! DNS monitors
//!
//! Two independent monitors observe the same question, "which DNS servers
//! does the real network use", from different angles:
//!
//! - [`EventDrivenDnsMonitor`]: reacts to network callbacks, VPN-masking aware
//! - [`PolledDnsMonitor`]: adaptive-interval heuristic discovery
//!
//! They do not share state or schedulers.

mod discovery;
pub mod event_driven;
pub mod polled;

pub use event_driven::EventDrivenDnsMonitor;
pub use polled::{MonitorStatus, PlatformSources, PollMode, PolledDnsMonitor, UNKNOWN_CARRIER};
