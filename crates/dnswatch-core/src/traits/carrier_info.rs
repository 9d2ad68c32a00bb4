// # Carrier Info Trait
//
// Best-effort descriptors of the active connection: mobile operator,
// radio access technology and WiFi SSID. Every method may fail or return
// `None`; callers degrade to an "unknown" label.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Radio access technology of a cellular connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioTechnology {
    Gprs,
    Edge,
    Umts,
    Hsdpa,
    Hsupa,
    Hspa,
    HspaPlus,
    Lte,
    Nr,
    /// Anything outside the generation table, kept verbatim
    Other(String),
}

impl RadioTechnology {
    /// Parse a platform technology name (`LTE`, `HSPA+`, `nr`, ...)
    pub fn from_name(name: &str) -> Self {
        let normalized = name.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "GPRS" => RadioTechnology::Gprs,
            "EDGE" => RadioTechnology::Edge,
            "UMTS" => RadioTechnology::Umts,
            "HSDPA" => RadioTechnology::Hsdpa,
            "HSUPA" => RadioTechnology::Hsupa,
            "HSPA" => RadioTechnology::Hspa,
            "HSPA+" | "HSPAP" => RadioTechnology::HspaPlus,
            "LTE" | "LTE_CA" => RadioTechnology::Lte,
            "NR" | "NR_SA" | "NR_NSA" => RadioTechnology::Nr,
            _ => RadioTechnology::Other(name.trim().to_string()),
        }
    }

    /// Generation label from the fixed mapping table
    pub fn generation(&self) -> Option<&'static str> {
        match self {
            RadioTechnology::Gprs | RadioTechnology::Edge => Some("2G"),
            RadioTechnology::Umts
            | RadioTechnology::Hsdpa
            | RadioTechnology::Hsupa
            | RadioTechnology::Hspa
            | RadioTechnology::HspaPlus => Some("3G"),
            RadioTechnology::Lte => Some("4G"),
            RadioTechnology::Nr => Some("5G"),
            RadioTechnology::Other(_) => None,
        }
    }
}

impl fmt::Display for RadioTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioTechnology::Gprs => f.write_str("GPRS"),
            RadioTechnology::Edge => f.write_str("EDGE"),
            RadioTechnology::Umts => f.write_str("UMTS"),
            RadioTechnology::Hsdpa => f.write_str("HSDPA"),
            RadioTechnology::Hsupa => f.write_str("HSUPA"),
            RadioTechnology::Hspa => f.write_str("HSPA"),
            RadioTechnology::HspaPlus => f.write_str("HSPA+"),
            RadioTechnology::Lte => f.write_str("LTE"),
            RadioTechnology::Nr => f.write_str("NR"),
            RadioTechnology::Other(name) => f.write_str(name),
        }
    }
}

/// Trait for carrier info providers
pub trait CarrierInfoProvider: Send + Sync {
    /// Name of the mobile operator serving the active data connection
    fn active_operator_name(&self) -> Result<Option<String>>;

    /// Radio technology of the active data connection
    fn active_radio_technology(&self) -> Result<Option<RadioTechnology>>;

    /// SSID of the connected WiFi network
    fn wifi_ssid(&self) -> Result<Option<String>> {
        Ok(None)
    }
}
