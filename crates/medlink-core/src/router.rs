//! Event routing from collaborator streams to the typed event dispatcher.
//!
//! Every collaborator stream is consumed by one spawned task, so values from
//! a stream are published in the order they were produced. Each task
//! normalizes raw strings into [`TypedEvent`]s, tags per-device events with
//! the producing handle's key and publishes them through a [`DeliveryGate`].
//!
//! Tasks stop on cancellation of their [`Subscription`], which happens when
//! the subscription is released or dropped. Values the stream already holds
//! at cancellation are still published before the task exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{FutureExt, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use medlink_types::{ConnectionState, DeviceKind, DevicePayload, ScannerState};

use crate::events::{EventDispatcher, TypedEvent};
use crate::registry::RegistryKey;
use crate::traits::{MedicalDevice, RawStream};

/// Open/closed switch shared by the subscriptions of one handle.
///
/// Publishing holds the read side for the duration of a send. Closing takes
/// the write side, so once [`close`](Self::close) returns no publish is in
/// flight and none will start.
#[derive(Debug)]
pub struct DeliveryGate {
    open: RwLock<bool>,
}

impl DeliveryGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self {
            open: RwLock::new(true),
        }
    }

    /// Close the gate, waiting for in-flight publishes to finish.
    pub async fn close(&self) {
        *self.open.write().await = false;
    }

    /// Whether events may still pass.
    pub async fn is_open(&self) -> bool {
        *self.open.read().await
    }

    /// Send `event` if the gate is open. Returns whether it was sent.
    async fn publish(&self, events: &EventDispatcher, event: TypedEvent) -> bool {
        let open = self.open.read().await;
        if *open {
            events.send(event);
            true
        } else {
            false
        }
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// One active listener on one collaborator stream.
///
/// Released exactly once: either explicitly through
/// [`release`](Self::release) or [`drain`](Self::drain), or implicitly on
/// drop.
#[derive(Debug)]
pub struct Subscription {
    stream: &'static str,
    cancel: CancellationToken,
    counter: Option<Arc<AtomicUsize>>,
    task: Option<JoinHandle<()>>,
    released: bool,
}

impl Subscription {
    /// Which stream this subscription listens to.
    pub fn stream(&self) -> &'static str {
        self.stream
    }

    /// Stop listening.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// Stop listening and wait until the routing task has exited.
    ///
    /// Values already buffered in the stream are published first.
    pub async fn drain(mut self) {
        self.release_inner();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(stream = self.stream, "Routing task failed: {}", e);
        }
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.cancel.cancel();
        if let Some(counter) = &self.counter {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Attaches subscription tasks to collaborator streams.
///
/// Clones share the dispatcher and the live subscription counter.
#[derive(Debug, Clone)]
pub struct EventRouter {
    events: EventDispatcher,
    device_subscriptions: Arc<AtomicUsize>,
}

impl EventRouter {
    /// Create a router publishing into `events`.
    pub fn new(events: EventDispatcher) -> Self {
        Self {
            events,
            device_subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The dispatcher events are published into.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Number of live per-device subscriptions across every handle.
    pub fn subscription_count(&self) -> usize {
        self.device_subscriptions.load(Ordering::Acquire)
    }

    /// Listen to the scanner's state stream.
    pub fn attach_scanner(&self, stream: RawStream, gate: Arc<DeliveryGate>) -> Subscription {
        self.spawn("scanner.state", stream, gate, None, normalize_scanner_state)
    }

    /// Listen to both streams of a device, tagging events with `key`.
    ///
    /// Both streams are opened before this returns, so nothing the device
    /// publishes afterwards is missed.
    pub fn attach_device(
        &self,
        key: &RegistryKey,
        kind: DeviceKind,
        device: &dyn MedicalDevice,
        gate: &Arc<DeliveryGate>,
    ) -> Vec<Subscription> {
        let counter = Some(Arc::clone(&self.device_subscriptions));

        let connection_key = key.clone();
        let connection = self.spawn(
            "device.connectionState",
            device.connection_state_stream(),
            Arc::clone(gate),
            counter.clone(),
            move |raw| normalize_connection_state(&connection_key, raw),
        );

        let data_key = key.clone();
        let data = self.spawn(
            "device.data",
            device.data_stream(),
            Arc::clone(gate),
            counter,
            move |raw| normalize_data(&data_key, kind, raw),
        );

        vec![connection, data]
    }

    fn spawn<F>(
        &self,
        stream_name: &'static str,
        mut stream: RawStream,
        gate: Arc<DeliveryGate>,
        counter: Option<Arc<AtomicUsize>>,
        normalize: F,
    ) -> Subscription
    where
        F: Fn(String) -> Option<TypedEvent> + Send + 'static,
    {
        if let Some(counter) = &counter {
            counter.fetch_add(1, Ordering::AcqRel);
        }

        let cancel = CancellationToken::new();
        let task_token = cancel.clone();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => {
                        while let Some(Some(raw)) = stream.next().now_or_never() {
                            if let Some(event) = normalize(raw) {
                                gate.publish(&events, event).await;
                            }
                        }
                        debug!(stream = stream_name, "Subscription cancelled");
                        break;
                    }
                    item = stream.next() => {
                        let Some(raw) = item else {
                            debug!(stream = stream_name, "Collaborator stream ended");
                            break;
                        };
                        let Some(event) = normalize(raw) else {
                            continue;
                        };
                        if !gate.publish(&events, event).await {
                            debug!(stream = stream_name, "Discarded event after teardown");
                        }
                    }
                }
            }
        });

        Subscription {
            stream: stream_name,
            cancel,
            counter,
            task: Some(task),
            released: false,
        }
    }
}

fn normalize_scanner_state(raw: String) -> Option<TypedEvent> {
    match ScannerState::from_raw(&raw) {
        Ok(state) => Some(TypedEvent::ScannerStateChanged { state }),
        Err(e) => {
            warn!(raw = %raw, "Dropping scanner event: {}", e);
            None
        }
    }
}

fn normalize_connection_state(key: &RegistryKey, raw: String) -> Option<TypedEvent> {
    match ConnectionState::from_raw(&raw) {
        Ok(state) => Some(TypedEvent::DeviceConnectionChanged {
            key: key.clone(),
            state,
        }),
        Err(e) => {
            warn!(key = %key, raw = %raw, "Dropping connection event: {}", e);
            None
        }
    }
}

fn normalize_data(key: &RegistryKey, kind: DeviceKind, raw: String) -> Option<TypedEvent> {
    match DevicePayload::decode(kind, &raw) {
        Ok(payload) => Some(TypedEvent::DeviceDataReceived {
            key: key.clone(),
            payload,
        }),
        Err(e) => {
            warn!(key = %key, kind = %kind, raw = %raw, "Dropping data event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::channel::mpsc;
    use tokio::time::timeout;

    use crate::events::EventFilter;

    fn raw_channel() -> (mpsc::UnboundedSender<String>, RawStream) {
        let (tx, rx) = mpsc::unbounded();
        (tx, rx.boxed())
    }

    #[test]
    fn test_normalize_scanner_state() {
        assert_eq!(
            normalize_scanner_state("STARTED".to_string()),
            Some(TypedEvent::ScannerStateChanged {
                state: ScannerState::Started
            })
        );
        assert_eq!(normalize_scanner_state("warming_up".to_string()), None);
    }

    #[test]
    fn test_normalize_connection_state_tags_key() {
        let key = RegistryKey::new("k");
        assert_eq!(
            normalize_connection_state(&key, "Paired".to_string()),
            Some(TypedEvent::DeviceConnectionChanged {
                key: key.clone(),
                state: ConnectionState::Paired
            })
        );
        assert_eq!(normalize_connection_state(&key, "bonding".to_string()), None);
    }

    #[test]
    fn test_normalize_data_uses_handle_kind() {
        let key = RegistryKey::new("k");
        let raw = r#"{"timeMilliseconds": 5, "spo2Percentage": 97}"#.to_string();

        let event = normalize_data(&key, DeviceKind::Wellue, raw.clone()).unwrap();
        assert!(matches!(
            event,
            TypedEvent::DeviceDataReceived { payload: DevicePayload::Oximetry(_), .. }
        ));

        // The same text is not a valid blood pressure record.
        assert_eq!(normalize_data(&key, DeviceKind::Yuwell, raw), None);
        assert_eq!(normalize_data(&key, DeviceKind::Wellue, "not json".to_string()), None);
    }

    #[tokio::test]
    async fn test_scanner_subscription_publishes_in_order() {
        let events = EventDispatcher::new();
        let router = EventRouter::new(events.clone());
        let mut rx = events.subscribe(EventFilter::Scanner);

        let (tx, stream) = raw_channel();
        let _sub = router.attach_scanner(stream, Arc::new(DeliveryGate::new()));

        for raw in ["starting", "bogus", "STARTED", "stopped"] {
            tx.unbounded_send(raw.to_string()).unwrap();
        }

        let mut states = Vec::new();
        for _ in 0..3 {
            match timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(TypedEvent::ScannerStateChanged { state })) => states.push(state),
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert_eq!(
            states,
            vec![ScannerState::Starting, ScannerState::Started, ScannerState::Stopped]
        );
    }

    #[tokio::test]
    async fn test_closed_gate_discards_events() {
        let events = EventDispatcher::new();
        let router = EventRouter::new(events.clone());
        let mut rx = events.subscribe(EventFilter::All);

        let gate = Arc::new(DeliveryGate::new());
        let (tx, stream) = raw_channel();
        let _sub = router.attach_scanner(stream, Arc::clone(&gate));

        gate.close().await;
        assert!(!gate.is_open().await);
        tx.unbounded_send("started".to_string()).unwrap();

        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_release_is_counted_once() {
        let router = EventRouter::new(EventDispatcher::new());
        let counter = Some(Arc::clone(&router.device_subscriptions));
        let (_tx, stream) = raw_channel();

        let sub = router.spawn(
            "device.data",
            stream,
            Arc::new(DeliveryGate::new()),
            counter,
            |_| None,
        );
        assert_eq!(router.subscription_count(), 1);
        assert_eq!(sub.stream(), "device.data");

        sub.release();
        assert_eq!(router.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_publishes_buffered_values_then_stops() {
        let events = EventDispatcher::new();
        let router = EventRouter::new(events.clone());
        let mut rx = events.subscribe(EventFilter::All);

        let (tx, stream) = raw_channel();
        let sub = router.attach_scanner(stream, Arc::new(DeliveryGate::new()));
        tx.unbounded_send("starting".to_string()).unwrap();
        tx.unbounded_send("stopped".to_string()).unwrap();
        sub.drain().await;

        assert_eq!(
            rx.drain(),
            vec![
                TypedEvent::ScannerStateChanged {
                    state: ScannerState::Starting
                },
                TypedEvent::ScannerStateChanged {
                    state: ScannerState::Stopped
                },
            ]
        );
        assert!(tx.unbounded_send("started".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_task() {
        let events = EventDispatcher::new();
        let router = EventRouter::new(events.clone());
        let mut rx = events.subscribe(EventFilter::All);

        let (tx, stream) = raw_channel();
        let sub = router.attach_scanner(stream, Arc::new(DeliveryGate::new()));
        drop(sub);

        // Give the task a chance to observe the cancellation.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.unbounded_send("started".to_string());
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }
}
