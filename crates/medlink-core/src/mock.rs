//! Mock collaborators for testing.
//!
//! This module provides in-memory implementations of the collaborator traits
//! so the bridge can be exercised without any device transport.
//!
//! - [`MockDevice`] implements [`MedicalDevice`] and lets tests inject raw
//!   connection states and data payloads into its streams.
//! - [`MockScanner`] implements [`DeviceScanner`], tracks its scan set and
//!   publishes state changes when started or stopped.
//! - [`MockDeviceFactory`] implements [`DeviceFactory`], remembers every
//!   device it created and can be told to refuse kinds or reuse a key.
//!
//! # Features
//!
//! - **Failure injection**: make devices or the scanner fail their operations
//! - **Stream injection**: push raw values through any collaborator stream
//! - **Call accounting**: count disconnects and scan set changes
//! - **Call ordering**: share a [`MockCallLog`] between collaborators to
//!   record the order of teardown calls

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;

use medlink_types::{DeviceKind, DeviceType, SourceType};

use crate::error::{Error, Result};
use crate::traits::{DeviceFactory, DeviceScanner, MedicalDevice, RawStream};
use crate::util::lock;

/// Fan-out point behind a mock stream: every opened stream gets every value.
#[derive(Debug, Default)]
struct MockStreams {
    senders: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl MockStreams {
    fn open(&self) -> RawStream {
        let (tx, rx) = mpsc::unbounded();
        lock(&self.senders).push(tx);
        rx.boxed()
    }

    fn emit(&self, raw: &str) -> usize {
        let mut senders = lock(&self.senders);
        senders.retain(|tx| !tx.is_closed());
        senders
            .iter()
            .filter(|tx| tx.unbounded_send(raw.to_string()).is_ok())
            .count()
    }

    fn listeners(&self) -> usize {
        let mut senders = lock(&self.senders);
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }
}

/// Ordered record of collaborator calls, shared between mocks.
///
/// Entries read `"<operation> <device key>"`.
#[derive(Debug, Clone, Default)]
pub struct MockCallLog(Arc<Mutex<Vec<String>>>);

impl MockCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, operation: &str, key: &str) {
        lock(&self.0).push(format!("{operation} {key}"));
    }

    /// Every entry so far, oldest first.
    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }
}

/// A mock medical device for testing.
///
/// # Example
///
/// ```
/// use medlink_core::{MedicalDevice, MockDevice};
/// use medlink_types::{DeviceKind, DeviceType};
///
/// let device = MockDevice::new(DeviceKind::Yuwell);
/// assert_eq!(device.device_id(), "yuwell");
/// assert_eq!(device.device_type(), DeviceType::BloodPressureMonitor);
/// ```
pub struct MockDevice {
    key: String,
    kind: DeviceKind,
    source_type: SourceType,
    device_type: DeviceType,
    model: String,
    bluetooth_name: Mutex<Option<String>>,
    bluetooth_mac_address: Mutex<Option<String>>,
    needs_pairing: AtomicBool,
    connected: AtomicBool,
    disconnect_count: AtomicU32,
    match_names: Mutex<Vec<String>>,
    match_mac_addresses: Mutex<Vec<String>>,
    auto_time_sync: AtomicBool,
    auto_notify: AtomicBool,
    filter_kinds: Mutex<Option<Vec<DeviceKind>>>,
    connection_streams: MockStreams,
    data_streams: MockStreams,
    should_fail: AtomicBool,
    fail_message: Mutex<String>,
    emit_on_disconnect: AtomicBool,
    call_log: Mutex<Option<MockCallLog>>,
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockDevice {
    /// Create a mock device of `kind` with a fresh random key.
    pub fn new(kind: DeviceKind) -> Self {
        MockDeviceBuilder::new().kind(kind).build()
    }

    /// Create a mock device of `kind` with an explicit key.
    pub fn with_key(key: &str, kind: DeviceKind) -> Self {
        MockDeviceBuilder::new().key(key).kind(kind).build()
    }

    /// Kind this device was created as.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn check_should_fail(&self) -> Result<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            Err(Error::collaborator(lock(&self.fail_message).clone()))
        } else {
            Ok(())
        }
    }

    // --- Test control methods ---

    /// Push a raw connection state into every open connection stream.
    ///
    /// Returns how many streams received it.
    pub fn emit_connection_state(&self, raw: &str) -> usize {
        if let Ok(state) = medlink_types::ConnectionState::from_raw(raw) {
            self.connected.store(
                state != medlink_types::ConnectionState::Disconnected,
                Ordering::Relaxed,
            );
        }
        self.connection_streams.emit(raw)
    }

    /// Push a raw data payload into every open data stream.
    pub fn emit_data(&self, raw: &str) -> usize {
        self.data_streams.emit(raw)
    }

    /// Number of connection and data streams still open.
    pub fn open_streams(&self) -> usize {
        self.connection_streams.listeners() + self.data_streams.listeners()
    }

    /// Make every fallible operation fail.
    pub fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *lock(&self.fail_message) = msg.to_string();
        }
    }

    /// Publish `disconnected` on the connection stream from inside
    /// [`MedicalDevice::disconnect`], as real transports do.
    pub fn set_emit_on_disconnect(&self, emit: bool) {
        self.emit_on_disconnect.store(emit, Ordering::Relaxed);
    }

    /// Record calls into `log`.
    pub fn set_call_log(&self, log: MockCallLog) {
        *lock(&self.call_log) = Some(log);
    }

    /// Set the Bluetooth name reported by the device.
    pub fn set_bluetooth_name(&self, name: Option<&str>) {
        *lock(&self.bluetooth_name) = name.map(str::to_string);
    }

    /// Set the MAC address reported by the device.
    pub fn set_bluetooth_mac_address(&self, address: Option<&str>) {
        *lock(&self.bluetooth_mac_address) = address.map(str::to_string);
    }

    /// Set whether the device requires pairing.
    pub fn set_needs_pairing(&self, needs_pairing: bool) {
        self.needs_pairing.store(needs_pairing, Ordering::Relaxed);
    }

    /// Number of disconnect calls received.
    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_count.load(Ordering::Relaxed)
    }

    /// Whether the device currently considers itself connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Names set through [`MedicalDevice::set_match_names`].
    pub fn match_names(&self) -> Vec<String> {
        lock(&self.match_names).clone()
    }

    /// Addresses set through [`MedicalDevice::set_match_mac_addresses`].
    pub fn match_mac_addresses(&self) -> Vec<String> {
        lock(&self.match_mac_addresses).clone()
    }

    /// Current auto time sync flag.
    pub fn auto_time_sync(&self) -> bool {
        self.auto_time_sync.load(Ordering::Relaxed)
    }

    /// Current auto notify flag.
    pub fn auto_notify(&self) -> bool {
        self.auto_notify.load(Ordering::Relaxed)
    }

    /// Kind filter set through [`MedicalDevice::set_filter_by_kinds`].
    pub fn filter_kinds(&self) -> Option<Vec<DeviceKind>> {
        lock(&self.filter_kinds).clone()
    }
}

#[async_trait]
impl MedicalDevice for MockDevice {
    fn key(&self) -> &str {
        &self.key
    }

    fn device_id(&self) -> String {
        self.kind.as_str().to_string()
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn device_model(&self) -> String {
        self.model.clone()
    }

    fn bluetooth_name(&self) -> Option<String> {
        lock(&self.bluetooth_name).clone()
    }

    fn bluetooth_mac_address(&self) -> Option<String> {
        lock(&self.bluetooth_mac_address).clone()
    }

    fn needs_pairing(&self) -> bool {
        self.needs_pairing.load(Ordering::Relaxed)
    }

    async fn set_match_names(&self, names: Vec<String>) -> Result<()> {
        self.check_should_fail()?;
        *lock(&self.match_names) = names;
        Ok(())
    }

    async fn set_match_mac_addresses(&self, addresses: Vec<String>) -> Result<()> {
        self.check_should_fail()?;
        *lock(&self.match_mac_addresses) = addresses;
        Ok(())
    }

    async fn set_auto_time_sync(&self, enabled: bool) -> Result<()> {
        self.check_should_fail()?;
        self.auto_time_sync.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    async fn set_auto_notify(&self, enabled: bool) -> Result<()> {
        self.check_should_fail()?;
        self.auto_notify.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    async fn set_filter_by_kinds(&self, kinds: Option<Vec<DeviceKind>>) -> Result<()> {
        self.check_should_fail()?;
        *lock(&self.filter_kinds) = kinds;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_count.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = lock(&self.call_log).as_ref() {
            log.record("disconnect", &self.key);
        }
        self.check_should_fail()?;
        if self.emit_on_disconnect.load(Ordering::Relaxed) {
            self.emit_connection_state("disconnected");
        } else {
            self.connected.store(false, Ordering::Relaxed);
        }
        Ok(())
    }

    fn connection_state_stream(&self) -> RawStream {
        self.connection_streams.open()
    }

    fn data_stream(&self) -> RawStream {
        self.data_streams.open()
    }
}

/// Builder for creating mock devices with custom settings.
#[derive(Debug)]
pub struct MockDeviceBuilder {
    key: Option<String>,
    kind: DeviceKind,
    model: Option<String>,
    bluetooth_name: Option<String>,
    bluetooth_mac_address: Option<String>,
    needs_pairing: Option<bool>,
    source_type: SourceType,
}

impl Default for MockDeviceBuilder {
    fn default() -> Self {
        Self {
            key: None,
            kind: DeviceKind::AccuChek,
            model: None,
            bluetooth_name: None,
            bluetooth_mac_address: None,
            needs_pairing: None,
            source_type: SourceType::BluetoothLowEnergy,
        }
    }
}

impl MockDeviceBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registry key the device reports.
    #[must_use]
    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    /// Set the device kind.
    #[must_use]
    pub fn kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Set the Bluetooth name.
    #[must_use]
    pub fn bluetooth_name(mut self, name: &str) -> Self {
        self.bluetooth_name = Some(name.to_string());
        self
    }

    /// Set the MAC address.
    #[must_use]
    pub fn bluetooth_mac_address(mut self, address: &str) -> Self {
        self.bluetooth_mac_address = Some(address.to_string());
        self
    }

    /// Set whether pairing is required.
    #[must_use]
    pub fn needs_pairing(mut self, needs_pairing: bool) -> Self {
        self.needs_pairing = Some(needs_pairing);
        self
    }

    /// Set the source type.
    #[must_use]
    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// Build the mock device.
    #[must_use]
    pub fn build(self) -> MockDevice {
        let (device_type, model, needs_pairing) = kind_defaults(self.kind);
        MockDevice {
            key: self.key.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            kind: self.kind,
            source_type: self.source_type,
            device_type,
            model: self.model.unwrap_or_else(|| model.to_string()),
            bluetooth_name: Mutex::new(self.bluetooth_name),
            bluetooth_mac_address: Mutex::new(
                self.bluetooth_mac_address.or_else(|| Some(random_mac_address())),
            ),
            needs_pairing: AtomicBool::new(self.needs_pairing.unwrap_or(needs_pairing)),
            connected: AtomicBool::new(false),
            disconnect_count: AtomicU32::new(0),
            match_names: Mutex::new(Vec::new()),
            match_mac_addresses: Mutex::new(Vec::new()),
            auto_time_sync: AtomicBool::new(false),
            auto_notify: AtomicBool::new(false),
            filter_kinds: Mutex::new(None),
            connection_streams: MockStreams::default(),
            data_streams: MockStreams::default(),
            should_fail: AtomicBool::new(false),
            fail_message: Mutex::new("Mock failure".to_string()),
            emit_on_disconnect: AtomicBool::new(false),
            call_log: Mutex::new(None),
        }
    }
}

fn kind_defaults(kind: DeviceKind) -> (DeviceType, &'static str, bool) {
    match kind {
        DeviceKind::AccuChek => (DeviceType::BloodGlucoseMeter, "Accu-Chek Guide", true),
        DeviceKind::LepuMedical => (DeviceType::PulseOximeter, "PC-60FW", false),
        DeviceKind::Wellue => (DeviceType::PulseOximeter, "FS20F", false),
        DeviceKind::Yuwell => (DeviceType::BloodPressureMonitor, "YE680A", false),
        DeviceKind::Auto => (DeviceType::Unknown, "Auto", false),
    }
}

fn random_mac_address() -> String {
    let bytes: [u8; 6] = rand::random();
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// A mock scanner for testing.
///
/// `start` publishes `STARTING` then `STARTED`; `stop` publishes `STOPPED`.
/// The upper-case names exercise the router's case-insensitive matching.
#[derive(Debug, Default)]
pub struct MockScanner {
    streams: MockStreams,
    scan_set: Mutex<Vec<String>>,
    session_key: Mutex<Option<String>>,
    running: AtomicBool,
    add_calls: AtomicU32,
    remove_calls: AtomicU32,
    should_fail: AtomicBool,
    call_log: Mutex<Option<MockCallLog>>,
}

impl MockScanner {
    /// Create an idle scanner with an empty scan set.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_should_fail(&self) -> Result<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            Err(Error::collaborator("Mock scanner failure"))
        } else {
            Ok(())
        }
    }

    // --- Test control methods ---

    /// Push a raw state into every open state stream.
    pub fn emit_state(&self, raw: &str) -> usize {
        self.streams.emit(raw)
    }

    /// Make every fallible operation fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Record scan set calls into `log`.
    pub fn set_call_log(&self, log: MockCallLog) {
        *lock(&self.call_log) = Some(log);
    }

    /// Keys of the devices in the scan set, in insertion order.
    pub fn scan_set(&self) -> Vec<String> {
        lock(&self.scan_set).clone()
    }

    /// Last session key received.
    pub fn session_key(&self) -> Option<String> {
        lock(&self.session_key).clone()
    }

    /// Whether the scanner is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Number of `add_device` calls received.
    pub fn add_calls(&self) -> u32 {
        self.add_calls.load(Ordering::Relaxed)
    }

    /// Number of `remove_device` calls received.
    pub fn remove_calls(&self) -> u32 {
        self.remove_calls.load(Ordering::Relaxed)
    }

    /// Number of state streams still open.
    pub fn open_streams(&self) -> usize {
        self.streams.listeners()
    }
}

#[async_trait]
impl DeviceScanner for MockScanner {
    fn state_stream(&self) -> RawStream {
        self.streams.open()
    }

    async fn set_session_key(&self, session_key: &str) -> Result<()> {
        self.check_should_fail()?;
        *lock(&self.session_key) = Some(session_key.to_string());
        Ok(())
    }

    async fn add_device(&self, device: Arc<dyn MedicalDevice>) -> Result<()> {
        self.add_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = lock(&self.call_log).as_ref() {
            log.record("add_device", device.key());
        }
        self.check_should_fail()?;
        let mut scan_set = lock(&self.scan_set);
        if !scan_set.iter().any(|k| k == device.key()) {
            scan_set.push(device.key().to_string());
        }
        Ok(())
    }

    async fn remove_device(&self, device: Arc<dyn MedicalDevice>) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = lock(&self.call_log).as_ref() {
            log.record("remove_device", device.key());
        }
        self.check_should_fail()?;
        lock(&self.scan_set).retain(|k| k != device.key());
        Ok(())
    }

    async fn clear_devices(&self) -> Result<()> {
        self.check_should_fail()?;
        lock(&self.scan_set).clear();
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.check_should_fail()?;
        self.streams.emit("STARTING");
        self.running.store(true, Ordering::Relaxed);
        self.streams.emit("STARTED");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.check_should_fail()?;
        self.running.store(false, Ordering::Relaxed);
        self.streams.emit("STOPPED");
        Ok(())
    }
}

/// A mock device factory for testing.
///
/// Creates a [`MockDevice`] for every supported kind and keeps a reference to
/// each so tests can drive them after handing them to the bridge.
#[derive(Debug, Default)]
pub struct MockDeviceFactory {
    created: Mutex<Vec<Arc<MockDevice>>>,
    unsupported: Mutex<HashSet<DeviceKind>>,
    fixed_key: Mutex<Option<String>>,
}

impl MockDeviceFactory {
    /// Create a factory supporting every kind.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to create devices of `kind`.
    pub fn set_unsupported(&self, kind: DeviceKind) {
        lock(&self.unsupported).insert(kind);
    }

    /// Give every new device this key instead of a random one.
    pub fn set_fixed_key(&self, key: Option<&str>) {
        *lock(&self.fixed_key) = key.map(str::to_string);
    }

    /// Every device created so far, in creation order.
    pub fn created_devices(&self) -> Vec<Arc<MockDevice>> {
        lock(&self.created).clone()
    }

    /// The most recently created device with this key.
    pub fn device(&self, key: &str) -> Option<Arc<MockDevice>> {
        lock(&self.created)
            .iter()
            .rev()
            .find(|d| d.key == key)
            .cloned()
    }

    /// Disconnect calls received across every created device.
    pub fn total_disconnects(&self) -> u32 {
        lock(&self.created)
            .iter()
            .map(|d| d.disconnect_count())
            .sum()
    }
}

impl DeviceFactory for MockDeviceFactory {
    fn create(&self, kind: DeviceKind) -> Option<Arc<dyn MedicalDevice>> {
        if lock(&self.unsupported).contains(&kind) {
            return None;
        }

        let mut builder = MockDeviceBuilder::new().kind(kind);
        if let Some(key) = lock(&self.fixed_key).as_deref() {
            builder = builder.key(key);
        }
        let device = Arc::new(builder.build());
        lock(&self.created).push(Arc::clone(&device));
        Some(device)
    }
}
