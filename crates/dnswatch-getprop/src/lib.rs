// # Android Property Integrations
//
// This crate provides the property-backed pieces of dnswatch for Android
// style hosts:
//
// - [`GetpropStore`]: a [`PropertyStore`] running `getprop <key>`
// - [`PropertyCarrierInfo`]: operator name and radio technology read from
//   the telephony properties of any [`PropertyStore`]
//
// ## Registration
//
// ```rust,ignore
// let registry = StoreRegistry::with_builtins();
// dnswatch_getprop::register(&registry);
// ```

use std::process::Command;

use dnswatch_core::config::PropertyStoreConfig;
use dnswatch_core::registry::StoreRegistry;
use dnswatch_core::traits::{CarrierInfoProvider, PropertyStore, PropertyStoreFactory, RadioTechnology};
use dnswatch_core::{Error, Result};
use tracing::trace;

/// Operator names, one per SIM slot, comma separated
pub const OPERATOR_NAME_KEY: &str = "gsm.operator.alpha";

/// Radio technologies, one per SIM slot, comma separated
pub const NETWORK_TYPE_KEY: &str = "gsm.network.type";

/// Property store backed by the `getprop` command
#[derive(Debug, Clone)]
pub struct GetpropStore {
    command: String,
}

impl GetpropStore {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Default for GetpropStore {
    fn default() -> Self {
        Self::new("getprop")
    }
}

/// Property keys are passed to a subprocess, so only `[A-Za-z0-9._-]+` is accepted
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("Invalid property key: {key:?}")))
    }
}

impl PropertyStore for GetpropStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        let output = Command::new(&self.command).arg(key).output().map_err(|e| {
            Error::property_store(format!("Failed to run `{} {}`: {}", self.command, key, e))
        })?;
        if !output.status.success() {
            return Err(Error::property_store(format!(
                "`{} {}` exited with {}",
                self.command, key, output.status
            )));
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        trace!("getprop {} = {:?}", key, value);
        Ok((!value.is_empty()).then_some(value))
    }

    fn name(&self) -> &str {
        "getprop"
    }
}

/// Factory for creating getprop stores
pub struct GetpropStoreFactory;

impl PropertyStoreFactory for GetpropStoreFactory {
    fn create(&self, config: &PropertyStoreConfig) -> Result<Box<dyn PropertyStore>> {
        match config {
            PropertyStoreConfig::Getprop { command } => Ok(Box::new(GetpropStore::new(command.clone()))),
            _ => Err(Error::config("Invalid config for getprop property store")),
        }
    }
}

/// Register the getprop store with a registry
pub fn register(registry: &StoreRegistry) {
    registry.register_store("getprop", Box::new(GetpropStoreFactory));
}

/// Carrier info read from telephony properties
///
/// Multi-SIM devices report one comma-separated entry per slot; the first
/// non-empty entry is used.
pub struct PropertyCarrierInfo<S> {
    store: S,
}

impl<S: PropertyStore> PropertyCarrierInfo<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn first_slot(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .store
            .get(key)
            .map_err(|e| Error::carrier(format!("Failed to read {key}: {e}")))?;
        Ok(value.and_then(|raw| {
            raw.split(',')
                .map(str::trim)
                .find(|entry| !entry.is_empty())
                .map(str::to_string)
        }))
    }
}

impl<S: PropertyStore> CarrierInfoProvider for PropertyCarrierInfo<S> {
    fn active_operator_name(&self) -> Result<Option<String>> {
        self.first_slot(OPERATOR_NAME_KEY)
    }

    fn active_radio_technology(&self) -> Result<Option<RadioTechnology>> {
        Ok(self
            .first_slot(NETWORK_TYPE_KEY)?
            .filter(|name| !name.eq_ignore_ascii_case("unknown"))
            .map(|name| RadioTechnology::from_name(&name)))
    }
}
