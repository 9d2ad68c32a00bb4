// # dnswatchd - DNS Watch Daemon
//
// Thin integration layer: reads configuration, wires the host integrations
// into both monitors and logs every change as one JSON line. All detection
// logic lives in dnswatch-core.
//
// ## Configuration
//
// `DNSWATCH_CONFIG` may point to a JSON file holding a full `WatchConfig`.
// Environment variables override it:
//
// - `DNSWATCH_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DNSWATCH_MASKED_BLOCK`: VPN DNS block, e.g. `192.18.0.0/16`
// - `DNSWATCH_RECHECK_DELAY_MS`: Re-check delay after a network loss
// - `DNSWATCH_NORMAL_INTERVAL_SECS`: Polling interval in NORMAL mode
// - `DNSWATCH_FAST_INTERVAL_SECS`: Polling interval in FAST mode
// - `DNSWATCH_PROPERTY_STORES`: Comma-separated store chain, e.g.
//   `getprop,file:/system/build.prop`
// - `DNSWATCH_POLL_OBSERVER_SECS`: Interval of the Linux snapshot diff
// - `DNSWATCH_POWER_SAVING`: `true` pins polling to NORMAL mode
//
// ## Signals
//
// - SIGTERM, SIGINT: clean shutdown
// - SIGHUP: immediate re-check by both monitors
//
// ## Example
//
// ```bash
// export DNSWATCH_LOG_LEVEL=debug
// export DNSWATCH_PROPERTY_STORES=file:/etc/dnswatch/props
// dnswatchd
// ```

use anyhow::{Context, Result};
use dnswatch_core::config::PropertyStoreConfig;
use dnswatch_core::stream::watch_channel;
use dnswatch_core::traits::{CarrierInfoProvider, InterfaceEnumerator, NetworkObserver, PropertyStore};
use dnswatch_core::{EventDrivenDnsMonitor, PlatformSources, PolledDnsMonitor, StoreRegistry, WatchConfig};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum WatchExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<WatchExitCode> for ExitCode {
    fn from(code: WatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
#[derive(Debug)]
struct Config {
    watch: WatchConfig,
    observer_interval_secs: Option<u64>,
    power_saving: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut watch = match lookup("DNSWATCH_CONFIG") {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read DNSWATCH_CONFIG file {path}"))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse DNSWATCH_CONFIG file {path}"))?
            }
            None => WatchConfig::default(),
        };

        if let Some(block) = lookup("DNSWATCH_MASKED_BLOCK") {
            watch.event.masked_dns_block = block
                .parse()
                .map_err(|e| anyhow::anyhow!("DNSWATCH_MASKED_BLOCK '{block}' is not a network: {e}"))?;
        }
        if let Some(delay) = parse_number(&lookup, "DNSWATCH_RECHECK_DELAY_MS")? {
            watch.event.recheck_delay_ms = delay;
        }
        if let Some(secs) = parse_number(&lookup, "DNSWATCH_NORMAL_INTERVAL_SECS")? {
            watch.polled.normal_interval_secs = secs;
        }
        if let Some(secs) = parse_number(&lookup, "DNSWATCH_FAST_INTERVAL_SECS")? {
            watch.polled.fast_interval_secs = secs;
        }
        if let Some(stores) = lookup("DNSWATCH_PROPERTY_STORES") {
            watch.property_stores = parse_property_stores(&stores)?;
        }

        let power_saving = match lookup("DNSWATCH_POWER_SAVING").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => anyhow::bail!("DNSWATCH_POWER_SAVING must be true or false. Got: {other}"),
        };

        Ok(Self {
            watch,
            observer_interval_secs: parse_number(&lookup, "DNSWATCH_POLL_OBSERVER_SECS")?,
            power_saving,
            log_level: lookup("DNSWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.watch.validate()?;

        if let Some(secs) = self.observer_interval_secs
            && !(1..=300).contains(&secs)
        {
            anyhow::bail!("DNSWATCH_POLL_OBSERVER_SECS must be between 1 and 300 seconds. Got: {secs}");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("{name} must be a non-negative integer. Got: {raw}"))
        })
        .transpose()
}

/// Parse `getprop[:command]`, `file:<path>` and `memory` entries
fn parse_property_stores(raw: &str) -> Result<Vec<PropertyStoreConfig>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (kind, arg) = match entry.split_once(':') {
                Some((kind, arg)) => (kind, Some(arg.to_string())),
                None => (entry, None),
            };
            match (kind, arg) {
                ("getprop", command) => Ok(PropertyStoreConfig::Getprop {
                    command: command.unwrap_or_else(|| "getprop".to_string()),
                }),
                ("file", Some(path)) => Ok(PropertyStoreConfig::File { path }),
                ("memory", None) => Ok(PropertyStoreConfig::Memory {
                    values: Default::default(),
                }),
                _ => anyhow::bail!(
                    "DNSWATCH_PROPERTY_STORES entry '{entry}' is not supported. \
                    Supported: getprop[:command], file:<path>, memory"
                ),
            }
        })
        .collect()
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return WatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return WatchExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WatchExitCode::ConfigError.into();
    }

    info!("Starting dnswatchd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            WatchExitCode::RuntimeError
        } else {
            WatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Host integrations selected by the enabled features
#[derive(Default)]
struct Host {
    observer: Option<Arc<dyn NetworkObserver>>,
    interfaces: Option<Arc<dyn InterfaceEnumerator>>,
    carrier: Option<Arc<dyn CarrierInfoProvider>>,
}

#[allow(unused_variables, unused_mut)]
fn host_integrations(config: &Config, properties: Option<&Arc<dyn PropertyStore>>) -> Host {
    let mut host = Host::default();

    #[cfg(feature = "linux")]
    {
        let mut observer = dnswatch_linux::LinuxNetworkObserver::new();
        if let Some(secs) = config.observer_interval_secs {
            observer = observer.with_poll_interval(std::time::Duration::from_secs(secs));
        }
        host.interfaces = Some(Arc::new(observer.interface_enumerator()));
        host.observer = Some(Arc::new(observer));
        host.carrier = Some(Arc::new(dnswatch_linux::LinuxCarrierInfo::new()));
        info!("Using Linux network observer");
    }

    #[cfg(feature = "getprop")]
    {
        if let Some(properties) = properties {
            host.carrier = Some(Arc::new(dnswatch_getprop::PropertyCarrierInfo::new(Arc::clone(
                properties,
            ))));
            debug!("Using telephony properties for carrier info");
        }
    }

    host
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = StoreRegistry::with_builtins();

    #[cfg(feature = "getprop")]
    dnswatch_getprop::register(&registry);

    debug!("Registered property stores: {:?}", registry.list_stores());

    let chain = registry
        .create_chain(&config.watch.property_stores)
        .context("Failed to build property store chain")?;
    let properties: Option<Arc<dyn PropertyStore>> = if chain.is_empty() {
        None
    } else {
        info!("Property store chain: {} store(s)", chain.len());
        Some(Arc::new(chain))
    };

    let host = host_integrations(&config, properties.as_ref());
    let (listener, mut events) = watch_channel();

    let event_monitor = match &host.observer {
        Some(observer) => {
            let monitor = Arc::new(EventDrivenDnsMonitor::new(Arc::clone(observer), &config.watch.event));
            monitor.add_listener(listener.clone());
            match monitor.start() {
                Ok(()) => Some(monitor),
                Err(e) => {
                    error!("Event-driven monitor unavailable, polling only: {}", e);
                    None
                }
            }
        }
        None => {
            warn!("No network observer available, event-driven monitor disabled");
            None
        }
    };

    let mut sources = PlatformSources::new();
    sources.observer = host.observer.clone();
    sources.properties = properties;
    sources.interfaces = host.interfaces.clone();
    sources.carrier = host.carrier.clone();

    let polled = PolledDnsMonitor::new(&config.watch.polled, sources);
    polled.set_power_saving_mode(config.power_saving);
    polled.add_listener("dnswatchd", listener);
    polled.start().context("Failed to start polled monitor")?;

    info!("Connection: {}", polled.carrier_info());
    info!("Daemon initialized, watching DNS changes");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut refresh = refresh_signal()?;

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                break;
            }
            Some(()) = refresh.recv() => {
                info!("Refresh requested");
                polled.refresh_dns();
                if let Some(monitor) = &event_monitor {
                    let monitor = Arc::clone(monitor);
                    tokio::task::spawn_blocking(move || monitor.force_check_network_change());
                }
            }
            Some(event) = events.next() => {
                match serde_json::to_string(&event) {
                    Ok(line) => info!(target: "dnswatch::event", "{}", line),
                    Err(e) => warn!("Failed to serialize event {:?}: {}", event, e),
                }
            }
        }
    }

    info!("Shutting down daemon");
    if let Some(monitor) = &event_monitor {
        debug!("{}", monitor.monitoring_status());
        monitor.stop();
    }
    debug!("{}", polled.monitoring_status());
    polled.stop();

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// The name of the signal received
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

/// SIGHUP deliveries as a channel
#[cfg(unix)]
fn refresh_signal() -> Result<tokio::sync::mpsc::Receiver<()>> {
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(not(unix))]
fn refresh_signal() -> Result<tokio::sync::mpsc::Receiver<()>> {
    let (_tx, rx) = tokio::sync::mpsc::channel(1);
    Ok(rx)
}
