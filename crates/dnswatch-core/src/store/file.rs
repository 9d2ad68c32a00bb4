// # File Property Store
//
// PropertyStore backed by a `key=value` property file.
//
// ## File Format
//
// ```text
// # comment
// net.dns1=8.8.8.8
// dhcp.wlan0.dns1 = 192.168.1.1
// ```
//
// Blank lines and lines starting with `#` or `!` are skipped. The last
// occurrence of a key wins.
//
// The file is re-read on every lookup, so values written by other
// processes are picked up; the polled monitor's cache bounds the cost.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::config::PropertyStoreConfig;
use crate::error::{Error, Result};
use crate::traits::{PropertyStore, PropertyStoreFactory};

/// Property store reading a `key=value` file
///
/// # Example
///
/// ```rust,no_run
/// use dnswatch_core::store::FilePropertyStore;
/// use dnswatch_core::traits::PropertyStore;
///
/// let store = FilePropertyStore::new("/system/build.prop");
/// let dns = store.get("net.dns1")?;
/// # Ok::<(), dnswatch_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FilePropertyStore {
    path: PathBuf,
}

impl FilePropertyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole file
    pub fn load(&self) -> Result<HashMap<String, String>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::property_store(format!(
                "Failed to read property file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(parse_properties(&content))
    }
}

/// Parse `key=value` lines
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            trace!("Skipping malformed property line: {}", line);
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        properties.insert(key.to_string(), value.trim().to_string());
    }

    properties
}

impl PropertyStore for FilePropertyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut properties = self.load()?;
        Ok(properties.remove(key).filter(|value| !value.is_empty()))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Factory for creating file property stores
pub struct FilePropertyStoreFactory;

impl PropertyStoreFactory for FilePropertyStoreFactory {
    fn create(&self, config: &PropertyStoreConfig) -> Result<Box<dyn PropertyStore>> {
        match config {
            PropertyStoreConfig::File { path } => Ok(Box::new(FilePropertyStore::new(path))),
            other => Err(Error::config(format!(
                "File store factory cannot build a {} store",
                other.type_name()
            ))),
        }
    }
}
