//! Command dispatch with per-request result correlation.
//!
//! A single actor task owns command execution. Callers submit commands
//! through a [`DispatcherHandle`]; every submission gets a fresh
//! [`RequestId`] and a slot in the [`PendingResults`] table, and the actor
//! completes exactly that slot. Concurrent callers therefore always receive
//! their own outcome.
//!
//! ```ignore
//! let key = bridge.commands().create_device("yuwell").await?;
//! bridge.commands().set_auto_notify(key.as_str(), true).await?;
//! let model = bridge.commands().get_device_model(key.as_str()).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use medlink_types::{DeviceKind, MeasurementUnit, convert_unit};

use crate::env::EnvSelector;
use crate::error::{CommandError, Error, ErrorKind, Result};
use crate::registry::{Registry, RegistryKey};
use crate::scanner::ScannerFacade;
use crate::util::{lock, require_non_empty, require_non_empty_entries};

/// Correlation token of one submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Successful result of a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CommandValue {
    /// The command had an effect and nothing to report.
    Unit,
    Text(String),
    Flag(bool),
    Number(f64),
    /// Key of a newly created handle.
    Key(RegistryKey),
}

/// Outcome every command resolves with.
pub type CommandOutcome = std::result::Result<CommandValue, CommandError>;

/// Every operation the bridge accepts.
///
/// Deserializes from `{"op": "<operationName>", ...arguments}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    SetEnvMode { mode: String },
    SetSessionKey { session_key: String },
    CreateDevice { kind: String },
    SetMatchNames { key: String, names: Vec<String> },
    SetMatchMacAddresses { key: String, addresses: Vec<String> },
    /// Single-address form of [`Command::SetMatchMacAddresses`].
    SetMatchMacAddress { key: String, address: String },
    SetAutoTimeSync { key: String, enabled: bool },
    SetAutoNotify { key: String, enabled: bool },
    GetDeviceId { key: String },
    GetSourceType { key: String },
    GetDeviceType { key: String },
    GetDeviceModel { key: String },
    GetBluetoothName { key: String },
    GetBluetoothMacAddress { key: String },
    GetNeedsPairing { key: String },
    DeleteDevice { key: String },
    AddToScan { key: String },
    RemoveFromScan { key: String },
    ClearScanSet,
    StartScan,
    StopScan,
    ClearAllHandles,
    SetAutoFilterByKinds { key: String, kinds: Option<Vec<String>> },
    ConvertUnit { value: f64, from: String, to: String },
}

impl Command {
    /// External operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetEnvMode { .. } => "setEnvMode",
            Command::SetSessionKey { .. } => "setSessionKey",
            Command::CreateDevice { .. } => "createDevice",
            Command::SetMatchNames { .. } => "setMatchNames",
            Command::SetMatchMacAddresses { .. } => "setMatchMacAddresses",
            Command::SetMatchMacAddress { .. } => "setMatchMacAddress",
            Command::SetAutoTimeSync { .. } => "setAutoTimeSync",
            Command::SetAutoNotify { .. } => "setAutoNotify",
            Command::GetDeviceId { .. } => "getDeviceId",
            Command::GetSourceType { .. } => "getSourceType",
            Command::GetDeviceType { .. } => "getDeviceType",
            Command::GetDeviceModel { .. } => "getDeviceModel",
            Command::GetBluetoothName { .. } => "getBluetoothName",
            Command::GetBluetoothMacAddress { .. } => "getBluetoothMacAddress",
            Command::GetNeedsPairing { .. } => "getNeedsPairing",
            Command::DeleteDevice { .. } => "deleteDevice",
            Command::AddToScan { .. } => "addToScan",
            Command::RemoveFromScan { .. } => "removeFromScan",
            Command::ClearScanSet => "clearScanSet",
            Command::StartScan => "startScan",
            Command::StopScan => "stopScan",
            Command::ClearAllHandles => "clearAllHandles",
            Command::SetAutoFilterByKinds { .. } => "setAutoFilterByKinds",
            Command::ConvertUnit { .. } => "convertUnit",
        }
    }

    /// Handle key the command is scoped to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::SetMatchNames { key, .. }
            | Command::SetMatchMacAddresses { key, .. }
            | Command::SetMatchMacAddress { key, .. }
            | Command::SetAutoTimeSync { key, .. }
            | Command::SetAutoNotify { key, .. }
            | Command::GetDeviceId { key }
            | Command::GetSourceType { key }
            | Command::GetDeviceType { key }
            | Command::GetDeviceModel { key }
            | Command::GetBluetoothName { key }
            | Command::GetBluetoothMacAddress { key }
            | Command::GetNeedsPairing { key }
            | Command::DeleteDevice { key }
            | Command::AddToScan { key }
            | Command::RemoveFromScan { key }
            | Command::SetAutoFilterByKinds { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Result slots of in-flight commands, keyed by request id.
#[derive(Debug, Default)]
pub struct PendingResults {
    next_id: AtomicU64,
    slots: Mutex<HashMap<RequestId, oneshot::Sender<CommandOutcome>>>,
}

impl PendingResults {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh request id and its result slot.
    pub fn register(&self) -> (RequestId, oneshot::Receiver<CommandOutcome>) {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = oneshot::channel();
        lock(&self.slots).insert(id, tx);
        (id, rx)
    }

    /// Complete the slot of `id`.
    ///
    /// Returns `false` and logs when `id` was never issued or has already
    /// been completed.
    pub fn complete(&self, id: RequestId, outcome: CommandOutcome) -> bool {
        let Some(slot) = lock(&self.slots).remove(&id) else {
            warn!(request_id = %id, "Ignoring result for unknown request");
            return false;
        };
        if slot.send(outcome).is_err() {
            debug!(request_id = %id, "Caller stopped waiting for result");
        }
        true
    }

    /// Drop the slot of `id` without completing it.
    pub fn cancel(&self, id: RequestId) {
        lock(&self.slots).remove(&id);
    }

    /// Number of commands waiting for a result.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Whether no command is waiting.
    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }

    fn clear(&self) {
        lock(&self.slots).clear();
    }
}

/// Everything a command may act on.
#[derive(Debug, Clone)]
pub struct CommandContext {
    registry: Arc<Registry>,
    scanner: ScannerFacade,
    env: EnvSelector,
    scan_on_create: bool,
}

impl CommandContext {
    /// Bundle the components commands act on.
    pub fn new(
        registry: Arc<Registry>,
        scanner: ScannerFacade,
        env: EnvSelector,
        scan_on_create: bool,
    ) -> Self {
        Self {
            registry,
            scanner,
            env,
            scan_on_create,
        }
    }

    /// Execute one command.
    pub async fn execute(&self, command: Command) -> Result<CommandValue> {
        match command {
            Command::SetEnvMode { mode } => {
                self.env.set(&mode)?;
                Ok(CommandValue::Unit)
            }
            Command::SetSessionKey { session_key } => {
                self.scanner.set_session_key(&session_key).await?;
                Ok(CommandValue::Unit)
            }
            Command::CreateDevice { kind } => {
                require_non_empty("device kind", &kind)?;
                let key = self.registry.create(&kind).await?;
                if self.scan_on_create
                    && let Err(e) = self.scanner.add_to_scan(key.as_str()).await
                {
                    warn!(key = %key, "Failed to add new device to scan set: {}", e);
                }
                Ok(CommandValue::Key(key))
            }
            Command::SetMatchNames { key, names } => {
                require_non_empty_entries("names", &names)?;
                let handle = self.registry.acquire(&key).await?;
                handle.device().set_match_names(names).await?;
                Ok(CommandValue::Unit)
            }
            Command::SetMatchMacAddresses { key, addresses } => {
                require_non_empty_entries("addresses", &addresses)?;
                let handle = self.registry.acquire(&key).await?;
                handle.device().set_match_mac_addresses(addresses).await?;
                Ok(CommandValue::Unit)
            }
            Command::SetMatchMacAddress { key, address } => {
                require_non_empty("address", &address)?;
                let handle = self.registry.acquire(&key).await?;
                handle.device().set_match_mac_addresses(vec![address]).await?;
                Ok(CommandValue::Unit)
            }
            Command::SetAutoTimeSync { key, enabled } => {
                let handle = self.registry.acquire(&key).await?;
                handle.device().set_auto_time_sync(enabled).await?;
                Ok(CommandValue::Unit)
            }
            Command::SetAutoNotify { key, enabled } => {
                let handle = self.registry.acquire(&key).await?;
                handle.device().set_auto_notify(enabled).await?;
                Ok(CommandValue::Unit)
            }
            Command::GetDeviceId { key } => {
                let handle = self.registry.acquire(&key).await?;
                Ok(CommandValue::Text(handle.device().device_id()))
            }
            Command::GetSourceType { key } => {
                let handle = self.registry.acquire(&key).await?;
                Ok(CommandValue::Text(handle.device().source_type().as_str().to_string()))
            }
            Command::GetDeviceType { key } => {
                let handle = self.registry.acquire(&key).await?;
                Ok(CommandValue::Text(handle.device().device_type().as_str().to_string()))
            }
            Command::GetDeviceModel { key } => {
                let handle = self.registry.acquire(&key).await?;
                Ok(CommandValue::Text(handle.device().device_model()))
            }
            Command::GetBluetoothName { key } => {
                let handle = self.registry.acquire(&key).await?;
                Ok(optional_text(handle.device().bluetooth_name()))
            }
            Command::GetBluetoothMacAddress { key } => {
                let handle = self.registry.acquire(&key).await?;
                Ok(optional_text(handle.device().bluetooth_mac_address()))
            }
            Command::GetNeedsPairing { key } => {
                let handle = self.registry.acquire(&key).await?;
                Ok(CommandValue::Flag(handle.device().needs_pairing()))
            }
            Command::DeleteDevice { key } => {
                self.registry.delete(&key).await?;
                Ok(CommandValue::Unit)
            }
            Command::AddToScan { key } => {
                self.scanner.add_to_scan(&key).await?;
                Ok(CommandValue::Unit)
            }
            Command::RemoveFromScan { key } => {
                self.scanner.remove_from_scan(&key).await?;
                Ok(CommandValue::Unit)
            }
            Command::ClearScanSet => {
                self.scanner.clear_scan_set().await?;
                Ok(CommandValue::Unit)
            }
            Command::StartScan => {
                self.scanner.start().await?;
                Ok(CommandValue::Unit)
            }
            Command::StopScan => {
                self.scanner.stop().await?;
                Ok(CommandValue::Unit)
            }
            Command::ClearAllHandles => {
                self.registry.clear_all().await;
                Ok(CommandValue::Unit)
            }
            Command::SetAutoFilterByKinds { key, kinds } => {
                let kinds = kinds
                    .map(|kinds| {
                        kinds
                            .iter()
                            .map(|k| k.parse::<DeviceKind>())
                            .collect::<std::result::Result<Vec<_>, _>>()
                    })
                    .transpose()?;
                let handle = self.registry.acquire(&key).await?;
                if handle.kind() != DeviceKind::Auto {
                    return Err(Error::invalid_argument(format!(
                        "kind filters only apply to auto devices, '{}' is {}",
                        handle.key(),
                        handle.kind()
                    )));
                }
                handle.device().set_filter_by_kinds(kinds).await?;
                Ok(CommandValue::Unit)
            }
            Command::ConvertUnit { value, from, to } => {
                let from: MeasurementUnit = from.parse()?;
                let to: MeasurementUnit = to.parse()?;
                Ok(CommandValue::Number(convert_unit(value, from, to)?))
            }
        }
    }
}

fn optional_text(value: Option<String>) -> CommandValue {
    value.map_or(CommandValue::Unit, CommandValue::Text)
}

struct Envelope {
    id: RequestId,
    command: Command,
}

/// Spawns the command actor.
pub struct Dispatcher;

impl Dispatcher {
    /// Spawn the actor and return a handle for submitting commands.
    ///
    /// At most `capacity` commands wait in the queue; further submissions
    /// wait for room.
    pub fn spawn(context: CommandContext, capacity: usize) -> DispatcherHandle {
        let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));
        let pending = Arc::new(PendingResults::new());
        let cancel = CancellationToken::new();

        let tracker = TaskTracker::new();

        let task_pending = Arc::clone(&pending);
        let task_token = cancel.clone();
        tracker.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => {
                        info!("Command dispatcher shutting down");
                        break;
                    }
                    envelope = rx.recv() => {
                        let Some(Envelope { id, command }) = envelope else {
                            debug!("Every dispatcher handle dropped, stopping");
                            break;
                        };
                        let name = command.name();
                        debug!(
                            request_id = %id,
                            op = name,
                            key = ?command.key(),
                            "Dispatching command"
                        );
                        let outcome = context.execute(command).await.map_err(CommandError::from);
                        if let Err(e) = &outcome {
                            debug!(request_id = %id, op = name, "Command failed: {}", e);
                        }
                        task_pending.complete(id, outcome);
                    }
                }
            }
            rx.close();
            // Pending callers observe the dropped slots as BRIDGE_CLOSED.
            task_pending.clear();
        });
        tracker.close();

        DispatcherHandle {
            tx,
            pending,
            cancel,
            tracker,
        }
    }
}

/// Submits commands to the actor and awaits their outcomes.
///
/// Clones share the same actor.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Envelope>,
    pending: Arc<PendingResults>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

struct SlotGuard<'a> {
    pending: &'a PendingResults,
    id: RequestId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pending.cancel(self.id);
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("op", &self.command.name())
            .finish()
    }
}

impl DispatcherHandle {
    /// Submit a command and wait for its outcome.
    ///
    /// Fails with `BRIDGE_CLOSED` once the actor has stopped.
    pub async fn call(&self, command: Command) -> CommandOutcome {
        let (id, rx) = self.pending.register();
        // Reclaims the slot if this future is dropped before completion.
        let _slot = SlotGuard {
            pending: &self.pending,
            id,
        };
        if self.tx.send(Envelope { id, command }).await.is_err() {
            return Err(CommandError::bridge_closed());
        }
        rx.await.unwrap_or_else(|_| Err(CommandError::bridge_closed()))
    }

    /// Stop the actor. Queued and later commands fail with `BRIDGE_CLOSED`.
    ///
    /// A command already executing runs to completion; use
    /// [`stopped`](Self::stopped) to wait for it.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait until the actor has exited.
    pub async fn stopped(&self) {
        self.tracker.wait().await;
    }

    /// Whether the actor has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Number of commands waiting for a result.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    // --- Typed wrappers ---

    pub async fn set_env_mode(&self, mode: &str) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::SetEnvMode { mode: mode.to_string() }).await)
    }

    pub async fn set_session_key(
        &self,
        session_key: &str,
    ) -> std::result::Result<(), CommandError> {
        expect_unit(
            self.call(Command::SetSessionKey {
                session_key: session_key.to_string(),
            })
            .await,
        )
    }

    /// Create a device and return its key.
    pub async fn create_device(
        &self,
        kind: &str,
    ) -> std::result::Result<RegistryKey, CommandError> {
        match self.call(Command::CreateDevice { kind: kind.to_string() }).await? {
            CommandValue::Key(key) => Ok(key),
            other => Err(unexpected("createDevice", &other)),
        }
    }

    pub async fn set_match_names(
        &self,
        key: &str,
        names: Vec<String>,
    ) -> std::result::Result<(), CommandError> {
        expect_unit(
            self.call(Command::SetMatchNames {
                key: key.to_string(),
                names,
            })
            .await,
        )
    }

    pub async fn set_match_mac_addresses(
        &self,
        key: &str,
        addresses: Vec<String>,
    ) -> std::result::Result<(), CommandError> {
        expect_unit(
            self.call(Command::SetMatchMacAddresses {
                key: key.to_string(),
                addresses,
            })
            .await,
        )
    }

    pub async fn set_match_mac_address(
        &self,
        key: &str,
        address: &str,
    ) -> std::result::Result<(), CommandError> {
        expect_unit(
            self.call(Command::SetMatchMacAddress {
                key: key.to_string(),
                address: address.to_string(),
            })
            .await,
        )
    }

    pub async fn set_auto_time_sync(
        &self,
        key: &str,
        enabled: bool,
    ) -> std::result::Result<(), CommandError> {
        expect_unit(
            self.call(Command::SetAutoTimeSync {
                key: key.to_string(),
                enabled,
            })
            .await,
        )
    }

    pub async fn set_auto_notify(
        &self,
        key: &str,
        enabled: bool,
    ) -> std::result::Result<(), CommandError> {
        expect_unit(
            self.call(Command::SetAutoNotify {
                key: key.to_string(),
                enabled,
            })
            .await,
        )
    }

    pub async fn get_device_id(&self, key: &str) -> std::result::Result<String, CommandError> {
        expect_text(
            "getDeviceId",
            self.call(Command::GetDeviceId { key: key.to_string() }).await,
        )
    }

    pub async fn get_source_type(&self, key: &str) -> std::result::Result<String, CommandError> {
        expect_text(
            "getSourceType",
            self.call(Command::GetSourceType { key: key.to_string() }).await,
        )
    }

    pub async fn get_device_type(&self, key: &str) -> std::result::Result<String, CommandError> {
        expect_text(
            "getDeviceType",
            self.call(Command::GetDeviceType { key: key.to_string() }).await,
        )
    }

    pub async fn get_device_model(&self, key: &str) -> std::result::Result<String, CommandError> {
        expect_text(
            "getDeviceModel",
            self.call(Command::GetDeviceModel { key: key.to_string() }).await,
        )
    }

    /// Bluetooth name, or `None` while the device has not reported one.
    pub async fn get_bluetooth_name(
        &self,
        key: &str,
    ) -> std::result::Result<Option<String>, CommandError> {
        expect_optional_text(
            "getBluetoothName",
            self.call(Command::GetBluetoothName { key: key.to_string() }).await,
        )
    }

    pub async fn get_bluetooth_mac_address(
        &self,
        key: &str,
    ) -> std::result::Result<Option<String>, CommandError> {
        expect_optional_text(
            "getBluetoothMacAddress",
            self.call(Command::GetBluetoothMacAddress { key: key.to_string() })
                .await,
        )
    }

    pub async fn get_needs_pairing(&self, key: &str) -> std::result::Result<bool, CommandError> {
        match self.call(Command::GetNeedsPairing { key: key.to_string() }).await? {
            CommandValue::Flag(flag) => Ok(flag),
            other => Err(unexpected("getNeedsPairing", &other)),
        }
    }

    pub async fn delete_device(&self, key: &str) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::DeleteDevice { key: key.to_string() }).await)
    }

    pub async fn add_to_scan(&self, key: &str) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::AddToScan { key: key.to_string() }).await)
    }

    pub async fn remove_from_scan(&self, key: &str) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::RemoveFromScan { key: key.to_string() }).await)
    }

    pub async fn clear_scan_set(&self) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::ClearScanSet).await)
    }

    pub async fn start_scan(&self) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::StartScan).await)
    }

    pub async fn stop_scan(&self) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::StopScan).await)
    }

    pub async fn clear_all_handles(&self) -> std::result::Result<(), CommandError> {
        expect_unit(self.call(Command::ClearAllHandles).await)
    }

    /// Restrict an auto device to `kinds`, or clear the filter with `None`.
    pub async fn set_auto_filter_by_kinds(
        &self,
        key: &str,
        kinds: Option<Vec<String>>,
    ) -> std::result::Result<(), CommandError> {
        expect_unit(
            self.call(Command::SetAutoFilterByKinds {
                key: key.to_string(),
                kinds,
            })
            .await,
        )
    }

    pub async fn convert_unit(
        &self,
        value: f64,
        from: &str,
        to: &str,
    ) -> std::result::Result<f64, CommandError> {
        let command = Command::ConvertUnit {
            value,
            from: from.to_string(),
            to: to.to_string(),
        };
        match self.call(command).await? {
            CommandValue::Number(n) => Ok(n),
            other => Err(unexpected("convertUnit", &other)),
        }
    }
}

fn unexpected(op: &str, value: &CommandValue) -> CommandError {
    CommandError::new(
        ErrorKind::Collaborator,
        format!("{op} produced an unexpected result: {value:?}"),
    )
}

fn expect_unit(outcome: CommandOutcome) -> std::result::Result<(), CommandError> {
    match outcome? {
        CommandValue::Unit => Ok(()),
        other => Err(unexpected("command", &other)),
    }
}

fn expect_text(op: &str, outcome: CommandOutcome) -> std::result::Result<String, CommandError> {
    match outcome? {
        CommandValue::Text(text) => Ok(text),
        other => Err(unexpected(op, &other)),
    }
}

fn expect_optional_text(
    op: &str,
    outcome: CommandOutcome,
) -> std::result::Result<Option<String>, CommandError> {
    match outcome? {
        CommandValue::Text(text) => Ok(Some(text)),
        CommandValue::Unit => Ok(None),
        other => Err(unexpected(op, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDispatcher;
    use crate::mock::{MockDeviceFactory, MockScanner};
    use crate::router::EventRouter;

    fn spawn_dispatcher() -> (DispatcherHandle, Arc<MockDeviceFactory>, Arc<MockScanner>) {
        let factory = Arc::new(MockDeviceFactory::new());
        let scanner = Arc::new(MockScanner::new());
        let registry = Arc::new(Registry::new(
            factory.clone(),
            scanner.clone(),
            EventRouter::new(EventDispatcher::new()),
        ));
        let facade = ScannerFacade::new(scanner.clone(), Arc::clone(&registry));
        let context = CommandContext::new(registry, facade, EnvSelector::default(), false);
        (Dispatcher::spawn(context, 8), factory, scanner)
    }

    #[test]
    fn test_pending_results_ids_are_fresh() {
        let pending = PendingResults::new();
        let (a, _rx_a) = pending.register();
        let (b, _rx_b) = pending.register();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_pending_results_complete_by_id() {
        let pending = PendingResults::new();
        let (a, rx_a) = pending.register();
        let (b, rx_b) = pending.register();

        assert!(pending.complete(b, Ok(CommandValue::Text("b".to_string()))));
        assert!(pending.complete(a, Ok(CommandValue::Text("a".to_string()))));

        assert_eq!(rx_a.await.unwrap(), Ok(CommandValue::Text("a".to_string())));
        assert_eq!(rx_b.await.unwrap(), Ok(CommandValue::Text("b".to_string())));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_results_ignore_unknown_and_repeated_ids() {
        let pending = PendingResults::new();
        assert!(!pending.complete(RequestId(42), Ok(CommandValue::Unit)));

        let (id, _rx) = pending.register();
        assert!(pending.complete(id, Ok(CommandValue::Unit)));
        assert!(!pending.complete(id, Ok(CommandValue::Flag(true))));
    }

    #[test]
    fn test_command_names_and_keys() {
        let command = Command::GetNeedsPairing { key: "k".to_string() };
        assert_eq!(command.name(), "getNeedsPairing");
        assert_eq!(command.key(), Some("k"));
        assert_eq!(Command::StartScan.key(), None);
    }

    #[test]
    fn test_command_deserializes_from_operation_name() {
        let command: Command =
            serde_json::from_str(r#"{"op": "setMatchMacAddress", "key": "k", "address": "AA"}"#)
                .unwrap();
        assert_eq!(
            command,
            Command::SetMatchMacAddress {
                key: "k".to_string(),
                address: "AA".to_string()
            }
        );

        let command: Command =
            serde_json::from_str(r#"{"op": "setSessionKey", "sessionKey": "s"}"#).unwrap();
        assert_eq!(command.name(), "setSessionKey");

        let command: Command = serde_json::from_str(r#"{"op": "clearAllHandles"}"#).unwrap();
        assert_eq!(command, Command::ClearAllHandles);
    }

    #[test]
    fn test_command_value_serialization() {
        let json = serde_json::to_value(CommandValue::Key(RegistryKey::new("k"))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "key", "value": "k"}));
        let json = serde_json::to_value(CommandValue::Unit).unwrap();
        assert_eq!(json, serde_json::json!({"type": "unit"}));
    }

    #[tokio::test]
    async fn test_create_and_read_attributes() {
        let (commands, _, _) = spawn_dispatcher();
        let key = commands.create_device("yuwell").await.unwrap();

        assert_eq!(commands.get_device_id(key.as_str()).await.unwrap(), "yuwell");
        assert_eq!(
            commands.get_device_type(key.as_str()).await.unwrap(),
            "blood_pressure_monitor"
        );
        assert_eq!(
            commands.get_source_type(key.as_str()).await.unwrap(),
            "bluetooth_low_energy"
        );
        assert_eq!(commands.get_device_model(key.as_str()).await.unwrap(), "YE680A");
        assert_eq!(commands.get_bluetooth_name(key.as_str()).await.unwrap(), None);
        assert!(!commands.get_needs_pairing(key.as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_handle_scoped_commands_reject_bad_keys() {
        let (commands, _, _) = spawn_dispatcher();
        let err = commands.get_device_model("nope").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidHandle);
        assert!(err.message.contains("nope"));

        let err = commands.set_auto_notify("", true).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_behavior_flags_reach_device() {
        let (commands, factory, _) = spawn_dispatcher();
        let key = commands.create_device("accu_chek").await.unwrap();
        let device = factory.device(key.as_str()).unwrap();

        commands.set_auto_time_sync(key.as_str(), true).await.unwrap();
        commands.set_auto_notify(key.as_str(), true).await.unwrap();
        commands
            .set_match_names(key.as_str(), vec!["meter".to_string()])
            .await
            .unwrap();
        commands
            .set_match_mac_address(key.as_str(), "AA:BB:CC:DD:EE:FF")
            .await
            .unwrap();

        assert!(device.auto_time_sync());
        assert!(device.auto_notify());
        assert_eq!(device.match_names(), vec!["meter"]);
        assert_eq!(device.match_mac_addresses(), vec!["AA:BB:CC:DD:EE:FF"]);
    }

    #[tokio::test]
    async fn test_empty_list_entries_are_rejected() {
        let (commands, _, _) = spawn_dispatcher();
        let key = commands.create_device("wellue").await.unwrap();
        let err = commands
            .set_match_mac_addresses(key.as_str(), vec![String::new()])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_auto_filter_only_for_auto_devices() {
        let (commands, factory, _) = spawn_dispatcher();
        let auto = commands.create_device("auto").await.unwrap();
        let wellue = commands.create_device("wellue").await.unwrap();

        commands
            .set_auto_filter_by_kinds(auto.as_str(), Some(vec!["yuwell".to_string()]))
            .await
            .unwrap();
        assert_eq!(
            factory.device(auto.as_str()).unwrap().filter_kinds(),
            Some(vec![DeviceKind::Yuwell])
        );

        let err = commands
            .set_auto_filter_by_kinds(wellue.as_str(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = commands
            .set_auto_filter_by_kinds(auto.as_str(), Some(vec!["omron".to_string()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownDeviceKind);
    }

    #[tokio::test]
    async fn test_convert_unit_command() {
        let (commands, _, _) = spawn_dispatcher();
        let mg_dl = commands
            .convert_unit(5.0, "millimoles_per_liter", "MILLIGRAMS_PER_DECILITER")
            .await
            .unwrap();
        assert!((mg_dl - 90.0).abs() < 1e-9);

        let err = commands.convert_unit(1.0, "GRAMS", "CELSIUS").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompatibleUnits);

        let err = commands.convert_unit(1.0, "STONE", "GRAMS").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(err.message.contains("STONE"));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_with_bridge_closed() {
        let (commands, _, _) = spawn_dispatcher();
        commands.shutdown();
        commands.stopped().await;
        assert!(commands.is_closed());

        let err = commands.start_scan().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::BridgeClosed);
        assert_eq!(commands.pending(), 0);
    }
}
