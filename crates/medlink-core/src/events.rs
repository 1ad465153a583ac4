//! Typed event system for scanner and device notifications.
//!
//! The [`router`](crate::router) turns raw collaborator values into
//! [`TypedEvent`]s and hands them to an [`EventDispatcher`], which fans them
//! out to every listener whose [`EventFilter`] matches.
//!
//! Each listener owns an unbounded FIFO queue, so a slow listener never
//! causes events to be dropped or reordered for itself or anyone else.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use medlink_types::{ConnectionState, DevicePayload, ScannerState};

use crate::registry::RegistryKey;
use crate::util::lock;

/// Channel name of scanner state events.
pub const SCANNER_STATE_CHANNEL: &str = "scanner.state";
/// Channel name of device connection state events.
pub const DEVICE_CONNECTION_CHANNEL: &str = "device.connectionState";
/// Channel name of device data events.
pub const DEVICE_DATA_CHANNEL: &str = "device.data";

/// Events published by the bridge.
///
/// Serializes as `{"channel": ..., "body": {...}}` using the external channel
/// names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel", content = "body")]
pub enum TypedEvent {
    /// The scanner changed state.
    #[serde(rename = "scanner.state")]
    ScannerStateChanged { state: ScannerState },
    /// A device changed connection state.
    #[serde(rename = "device.connectionState")]
    DeviceConnectionChanged {
        key: RegistryKey,
        state: ConnectionState,
    },
    /// A device published a decoded sample.
    #[serde(rename = "device.data")]
    DeviceDataReceived {
        key: RegistryKey,
        payload: DevicePayload,
    },
}

impl TypedEvent {
    /// External channel name.
    pub fn channel(&self) -> &'static str {
        match self {
            TypedEvent::ScannerStateChanged { .. } => SCANNER_STATE_CHANNEL,
            TypedEvent::DeviceConnectionChanged { .. } => DEVICE_CONNECTION_CHANNEL,
            TypedEvent::DeviceDataReceived { .. } => DEVICE_DATA_CHANNEL,
        }
    }

    /// Key of the handle that produced this event, if it is per-device.
    pub fn key(&self) -> Option<&RegistryKey> {
        match self {
            TypedEvent::ScannerStateChanged { .. } => None,
            TypedEvent::DeviceConnectionChanged { key, .. }
            | TypedEvent::DeviceDataReceived { key, .. } => Some(key),
        }
    }
}

/// Selects which events a listener receives.
///
/// Per-device filters match by exact key equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Scanner state events only.
    Scanner,
    /// Every event of one device.
    Device(RegistryKey),
    /// Connection state events of one device.
    DeviceConnection(RegistryKey),
    /// Data events of one device.
    DeviceData(RegistryKey),
}

impl EventFilter {
    /// Whether `event` passes this filter.
    pub fn matches(&self, event: &TypedEvent) -> bool {
        match (self, event) {
            (EventFilter::All, _) => true,
            (EventFilter::Scanner, TypedEvent::ScannerStateChanged { .. }) => true,
            (EventFilter::Device(wanted), event) => event.key() == Some(wanted),
            (
                EventFilter::DeviceConnection(wanted),
                TypedEvent::DeviceConnectionChanged { key, .. },
            ) => key == wanted,
            (EventFilter::DeviceData(wanted), TypedEvent::DeviceDataReceived { key, .. }) => {
                key == wanted
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
struct Listener {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<TypedEvent>,
}

/// Event dispatcher for sending events to multiple listeners.
///
/// Clones share the same set of listeners.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events passing `filter`.
    pub fn subscribe(&self, filter: EventFilter) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(Listener { filter, tx });
        EventReceiver { rx }
    }

    /// Send an event, returning how many listeners it was queued for.
    ///
    /// Listeners whose receiver was dropped are pruned.
    pub fn send(&self, event: TypedEvent) -> usize {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|listener| !listener.tx.is_closed());

        let mut delivered = 0;
        for listener in listeners.iter().filter(|l| l.filter.matches(&event)) {
            if listener.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Get the number of live listeners.
    pub fn listener_count(&self) -> usize {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|listener| !listener.tx.is_closed());
        listeners.len()
    }
}

/// Receiving side of an [`EventDispatcher`] subscription.
///
/// Dropping the receiver unsubscribes it.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<TypedEvent>,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` once the dispatcher and every clone of it are gone.
    pub async fn recv(&mut self) -> Option<TypedEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TypedEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every event that is already queued.
    pub fn drain(&mut self) -> Vec<TypedEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Stream for EventReceiver {
    type Item = TypedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
