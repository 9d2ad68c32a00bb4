//! Connection descriptors available to an unprivileged Linux process

use std::process::Command;

use dnswatch_core::traits::{CarrierInfoProvider, RadioTechnology};
use dnswatch_core::{Error, Result};

/// WiFi SSID through `iwgetid -r`
///
/// Operator name and radio technology would need ModemManager over D-Bus
/// and are reported as unknown.
#[derive(Debug, Clone)]
pub struct LinuxCarrierInfo {
    iwgetid: String,
}

impl LinuxCarrierInfo {
    pub fn new() -> Self {
        Self {
            iwgetid: "iwgetid".to_string(),
        }
    }

    /// Use another `iwgetid` binary
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.iwgetid = command.into();
        self
    }
}

impl Default for LinuxCarrierInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl CarrierInfoProvider for LinuxCarrierInfo {
    fn active_operator_name(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn active_radio_technology(&self) -> Result<Option<RadioTechnology>> {
        Ok(None)
    }

    fn wifi_ssid(&self) -> Result<Option<String>> {
        let output = Command::new(&self.iwgetid)
            .arg("-r")
            .output()
            .map_err(|e| Error::carrier(format!("Failed to run `{} -r`: {}", self.iwgetid, e)))?;
        // iwgetid exits non-zero when not associated
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_ssid(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_ssid(output: &str) -> Option<String> {
    let ssid = output.trim_end_matches(['\n', '\r']);
    (!ssid.is_empty()).then(|| ssid.to_string())
}
