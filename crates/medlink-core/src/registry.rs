//! Device handle registry.
//!
//! The registry is the exclusive owner of every device object the factory
//! creates. Hosts only ever see the [`RegistryKey`] of a handle and address
//! every handle-scoped operation through it.
//!
//! The handle map lock is never held across an awaited collaborator call.
//! Operations on one handle serialize against its deletion through a
//! per-handle operation lock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use medlink_types::DeviceKind;

use crate::error::{Error, Result};
use crate::router::{DeliveryGate, EventRouter, Subscription};
use crate::traits::{DeviceFactory, DeviceScanner, MedicalDevice};
use crate::util::{lock, require_non_empty};

/// Identity of a live device handle, as assigned by the factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryKey(String);

impl RegistryKey {
    /// Wrap a key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RegistryKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for RegistryKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for RegistryKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// A registered device and the subscriptions attached to it.
pub struct DeviceHandle {
    key: RegistryKey,
    kind: DeviceKind,
    device: Arc<dyn MedicalDevice>,
    gate: Arc<DeliveryGate>,
    subscriptions: Mutex<Vec<Subscription>>,
    op_lock: Arc<tokio::sync::Mutex<()>>,
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl DeviceHandle {
    /// Key of this handle.
    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    /// Kind the handle was created for.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// The device object owned by this handle.
    pub fn device(&self) -> &Arc<dyn MedicalDevice> {
        &self.device
    }

    /// Number of subscriptions still attached.
    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    /// Release every subscription, then close the delivery gate.
    ///
    /// Values a stream already holds are published before its task stops.
    async fn detach(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        for subscription in subscriptions {
            debug!(key = %self.key, stream = subscription.stream(), "Releasing subscription");
            subscription.drain().await;
        }
        self.gate.close().await;
    }
}

/// Exclusive access to one live handle.
///
/// Holds the handle's operation lock, so the handle cannot be deleted while
/// the guard is alive.
pub struct HandleGuard {
    handle: Arc<DeviceHandle>,
    _op: OwnedMutexGuard<()>,
}

impl Deref for HandleGuard {
    type Target = DeviceHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

/// Registry of live device handles.
pub struct Registry {
    handles: RwLock<HashMap<RegistryKey, Arc<DeviceHandle>>>,
    factory: Arc<dyn DeviceFactory>,
    scanner: Arc<dyn DeviceScanner>,
    router: EventRouter,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new(
        factory: Arc<dyn DeviceFactory>,
        scanner: Arc<dyn DeviceScanner>,
        router: EventRouter,
    ) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            factory,
            scanner,
            router,
        }
    }

    /// Create a device of `kind` and register it.
    ///
    /// Both device subscriptions are attached before the key is returned.
    pub async fn create(&self, kind: &str) -> Result<RegistryKey> {
        let kind: DeviceKind = kind.parse()?;
        let device = self
            .factory
            .create(kind)
            .ok_or_else(|| Error::UnknownDeviceKind(kind.to_string()))?;

        let key = RegistryKey::new(device.key());
        if key.as_str().trim().is_empty() {
            discard(device.as_ref(), &key).await;
            return Err(Error::collaborator(format!(
                "factory returned a {kind} device without a key"
            )));
        }

        {
            let mut handles = self.handles.write().await;
            if !handles.contains_key(&key) {
                // Attached under the map lock so a rejected device never
                // publishes under a live key.
                let gate = Arc::new(DeliveryGate::new());
                let subscriptions = self
                    .router
                    .attach_device(&key, kind, device.as_ref(), &gate);
                handles.insert(
                    key.clone(),
                    Arc::new(DeviceHandle {
                        key: key.clone(),
                        kind,
                        device,
                        gate,
                        subscriptions: Mutex::new(subscriptions),
                        op_lock: Arc::new(tokio::sync::Mutex::new(())),
                    }),
                );
                drop(handles);
                info!(key = %key, kind = %kind, "Created device handle");
                return Ok(key);
            }
        }

        warn!(key = %key, kind = %kind, "Factory returned a key that is already live");
        discard(device.as_ref(), &key).await;
        Err(Error::DuplicateKey(key.to_string()))
    }

    /// Find a live handle.
    pub async fn lookup(&self, key: &str) -> Result<Arc<DeviceHandle>> {
        require_non_empty("device key", key)?;
        self.handles
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::invalid_handle(key))
    }

    /// Find a live handle and lock it against concurrent deletion.
    pub async fn acquire(&self, key: &str) -> Result<HandleGuard> {
        let handle = self.lookup(key).await?;
        let op = Arc::clone(&handle.op_lock).lock_owned().await;
        if !self.is_live(&handle).await {
            return Err(Error::invalid_handle(key));
        }
        Ok(HandleGuard { handle, _op: op })
    }

    /// Tear a handle down and forget it.
    ///
    /// In order: remove the device from the scan set, disconnect it, release
    /// its subscriptions, remove the entry. Once this returns, no event
    /// carrying `key` is published. Collaborator failures during teardown are
    /// logged and do not stop it.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let guard = self.acquire(key).await?;
        let handle = &guard.handle;

        if let Err(e) = self.scanner.remove_device(Arc::clone(&handle.device)).await {
            warn!(key = %handle.key, "Failed to remove device from scan set: {}", e);
        }
        if let Err(e) = handle.device.disconnect().await {
            warn!(key = %handle.key, "Failed to disconnect device: {}", e);
        }
        handle.detach().await;
        self.handles.write().await.remove(&handle.key);

        info!(key = %handle.key, kind = %handle.kind, "Deleted device handle");
        Ok(())
    }

    /// Delete every handle, returning how many were torn down.
    ///
    /// Keys that vanish concurrently are skipped.
    pub async fn clear_all(&self) -> usize {
        let mut cleared = 0;
        for key in self.keys().await {
            match self.delete(key.as_str()).await {
                Ok(()) => cleared += 1,
                Err(Error::InvalidHandle(_)) => {
                    debug!(key = %key, "Handle vanished during clear");
                }
                Err(e) => warn!(key = %key, "Failed to delete handle: {}", e),
            }
        }
        info!(count = cleared, "Cleared all device handles");
        cleared
    }

    /// Keys of every live handle.
    pub async fn keys(&self) -> Vec<RegistryKey> {
        self.handles.read().await.keys().cloned().collect()
    }

    /// Get the number of live handles.
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Whether no handle is live.
    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    /// Number of live per-device subscriptions across every handle.
    pub fn subscription_count(&self) -> usize {
        self.router.subscription_count()
    }

    async fn is_live(&self, handle: &Arc<DeviceHandle>) -> bool {
        self.handles
            .read()
            .await
            .get(&handle.key)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }
}

async fn discard(device: &dyn MedicalDevice, key: &RegistryKey) {
    if let Err(e) = device.disconnect().await {
        warn!(key = %key, "Failed to disconnect discarded device: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventDispatcher, EventFilter, TypedEvent};
    use crate::mock::{MockCallLog, MockDeviceFactory, MockScanner};
    use medlink_types::ConnectionState;

    fn registry() -> (Registry, Arc<MockDeviceFactory>, Arc<MockScanner>) {
        let factory = Arc::new(MockDeviceFactory::new());
        let scanner = Arc::new(MockScanner::new());
        let registry = Registry::new(
            factory.clone(),
            scanner.clone(),
            EventRouter::new(EventDispatcher::new()),
        );
        (registry, factory, scanner)
    }

    #[test]
    fn test_registry_key_display_and_borrow() {
        let key = RegistryKey::from("abc");
        assert_eq!(key.to_string(), "abc");
        let map: HashMap<RegistryKey, u8> = [(key.clone(), 1)].into_iter().collect();
        assert_eq!(map.get("abc"), Some(&1));
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (registry, _, _) = registry();
        let key = registry.create("accu_chek").await.unwrap();

        let handle = registry.lookup(key.as_str()).await.unwrap();
        assert_eq!(handle.kind(), DeviceKind::AccuChek);
        assert_eq!(handle.subscription_count(), 2);
        assert_eq!(registry.subscription_count(), 2);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_leaves_registry_unchanged() {
        let (registry, factory, _) = registry();
        let err = registry.create("omron").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDeviceKind(ref k) if k == "omron"));

        factory.set_unsupported(DeviceKind::Wellue);
        let err = registry.create("wellue").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDeviceKind(_)));

        assert!(registry.is_empty().await);
        assert_eq!(registry.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_tears_down_in_order() {
        let events = EventDispatcher::new();
        let factory = Arc::new(MockDeviceFactory::new());
        let scanner = Arc::new(MockScanner::new());
        let registry = Registry::new(
            factory.clone(),
            scanner.clone(),
            EventRouter::new(events.clone()),
        );
        let log = MockCallLog::new();
        scanner.set_call_log(log.clone());

        let key = registry.create("yuwell").await.unwrap();
        let device = factory.device(key.as_str()).unwrap();
        device.set_call_log(log.clone());
        device.set_emit_on_disconnect(true);
        scanner.add_device(device.clone()).await.unwrap();
        let mut rx = events.subscribe(EventFilter::Device(key.clone()));

        registry.delete(key.as_str()).await.unwrap();

        assert_eq!(
            log.entries(),
            vec![
                format!("add_device {key}"),
                format!("remove_device {key}"),
                format!("disconnect {key}"),
            ]
        );
        // Emitted from inside disconnect, so the subscriptions were still live.
        assert_eq!(
            rx.drain(),
            vec![TypedEvent::DeviceConnectionChanged {
                key: key.clone(),
                state: ConnectionState::Disconnected,
            }]
        );
        assert_eq!(registry.subscription_count(), 0);
        assert_eq!(device.open_streams(), 0);
        assert!(scanner.scan_set().is_empty());

        assert_eq!(device.emit_connection_state("connected"), 0);
        assert_eq!(device.emit_data(r#"{"state": "success"}"#), 0);
        assert!(rx.try_recv().is_none());

        assert!(matches!(
            registry.lookup(key.as_str()).await,
            Err(Error::InvalidHandle(_))
        ));
        assert!(matches!(
            registry.delete(key.as_str()).await,
            Err(Error::InvalidHandle(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_continues_when_disconnect_fails() {
        let (registry, factory, _) = registry();
        let key = registry.create("wellue").await.unwrap();
        factory
            .device(key.as_str())
            .unwrap()
            .set_should_fail(true, Some("radio off"));

        registry.delete(key.as_str()).await.unwrap();
        assert!(registry.is_empty().await);
        assert_eq!(registry.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        let (registry, factory, _) = registry();
        factory.set_fixed_key(Some("same"));

        registry.create("wellue").await.unwrap();
        let err = registry.create("lepu_medical").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(ref k) if k == "same"));

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.subscription_count(), 2);
        let handle = registry.lookup("same").await.unwrap();
        assert_eq!(handle.kind(), DeviceKind::Wellue);

        // The rejected device never got a stream, so nothing it emits can
        // surface under the live key.
        let discarded = factory.created_devices().pop().unwrap();
        assert_eq!(discarded.disconnect_count(), 1);
        assert_eq!(discarded.open_streams(), 0);
        assert_eq!(discarded.emit_connection_state("connecting"), 0);
    }

    #[tokio::test]
    async fn test_empty_key_is_invalid_argument() {
        let (registry, _, _) = registry();
        assert!(matches!(
            registry.lookup("").await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_all_counts() {
        let (registry, factory, _) = registry();
        assert_eq!(registry.clear_all().await, 0);

        for kind in ["accu_chek", "wellue", "yuwell"] {
            registry.create(kind).await.unwrap();
        }
        assert_eq!(registry.clear_all().await, 3);
        assert!(registry.is_empty().await);
        assert_eq!(factory.total_disconnects(), 3);
    }

    #[tokio::test]
    async fn test_guard_blocks_delete_until_released() {
        let (registry, _, _) = registry();
        let registry = Arc::new(registry);
        let key = registry.create("auto").await.unwrap();

        let guard = registry.acquire(key.as_str()).await.unwrap();
        let deleting = {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            tokio::spawn(async move { registry.delete(key.as_str()).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!deleting.is_finished());
        assert_eq!(guard.subscription_count(), 2);

        drop(guard);
        deleting.await.unwrap().unwrap();
        assert!(registry.is_empty().await);
    }
}
