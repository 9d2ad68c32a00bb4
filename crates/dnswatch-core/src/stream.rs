//! Stream adapter over monitor listeners
//!
//! [`watch_channel()`] returns a listener that can be subscribed to either
//! monitor (or both) and a stream yielding every change it receives.
//!
//! ```rust,ignore
//! use tokio_stream::StreamExt;
//!
//! let (listener, mut events) = dnswatch_core::stream::watch_channel();
//! event_monitor.add_listener(listener.clone());
//! polled_monitor.add_listener("stream", listener);
//!
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```

use std::pin::Pin;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::trace;

use crate::dns::DnsServerSet;
use crate::network::{NetworkId, NetworkKind};
use crate::traits::{DnsChange, DnsChangeListener, NetworkDnsListener};

/// Monitor that produced a [`WatchEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorSource {
    EventDriven,
    Polled,
}

/// Change observed by a monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    DnsChanged {
        source: MonitorSource,
        network: Option<NetworkId>,
        kind: Option<NetworkKind>,
        old: DnsServerSet,
        new: DnsServerSet,
    },
    NetworkAvailable {
        network: NetworkId,
        kind: NetworkKind,
    },
    NetworkLost {
        network: NetworkId,
    },
    Error {
        source: MonitorSource,
        message: String,
    },
}

/// Stream of watch events
pub type WatchStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send>>;

/// Listener forwarding everything it receives into a [`WatchStream`]
#[derive(Debug, Clone)]
pub struct StreamListener {
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl StreamListener {
    fn send(&self, event: WatchEvent) {
        if self.tx.send(event).is_err() {
            trace!("Watch stream dropped, discarding event");
        }
    }
}

/// Create a listener and the stream it feeds
pub fn watch_channel() -> (std::sync::Arc<StreamListener>, WatchStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        std::sync::Arc::new(StreamListener { tx }),
        Box::pin(UnboundedReceiverStream::new(rx)),
    )
}

impl NetworkDnsListener for StreamListener {
    fn on_dns_changed(&self, change: &DnsChange) {
        self.send(WatchEvent::DnsChanged {
            source: MonitorSource::EventDriven,
            network: change.network,
            kind: Some(change.kind),
            old: change.old.clone(),
            new: change.new.clone(),
        });
    }

    fn on_network_available(&self, network: NetworkId, kind: NetworkKind) {
        self.send(WatchEvent::NetworkAvailable { network, kind });
    }

    fn on_network_lost(&self, network: NetworkId) {
        self.send(WatchEvent::NetworkLost { network });
    }
}

impl DnsChangeListener for StreamListener {
    fn on_dns_changed(&self, old: &DnsServerSet, new: &DnsServerSet) {
        self.send(WatchEvent::DnsChanged {
            source: MonitorSource::Polled,
            network: None,
            kind: None,
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn on_dns_error(&self, message: &str) {
        self.send(WatchEvent::Error {
            source: MonitorSource::Polled,
            message: message.to_string(),
        });
    }
}
