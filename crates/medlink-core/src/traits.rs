//! Trait abstractions for the collaborators the bridge drives.
//!
//! The bridge never talks to device transports itself. It consumes three
//! collaborators through these traits: a [`DeviceFactory`] that creates
//! device objects, the [`MedicalDevice`] objects it hands out, and a
//! [`DeviceScanner`] that owns the set of devices being scanned for. The
//! [`mock`](crate::mock) module provides in-memory implementations for tests
//! and demos.
//!
//! Streams carry raw strings exactly as the collaborator produces them;
//! normalization happens in the [`router`](crate::router).

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use medlink_types::{DeviceKind, DeviceType, SourceType};

use crate::error::Result;

/// A stream of raw values published by a collaborator.
pub type RawStream = BoxStream<'static, String>;

/// A single measurement device created by a [`DeviceFactory`].
///
/// # Example
///
/// ```ignore
/// use medlink_core::{MedicalDevice, Result};
///
/// async fn describe<D: MedicalDevice + ?Sized>(device: &D) -> Result<()> {
///     println!("{} ({})", device.device_model(), device.device_type());
///     device.set_auto_notify(true).await
/// }
/// ```
#[async_trait]
pub trait MedicalDevice: Send + Sync {
    // --- Identity ---

    /// Identity assigned to this object by the factory.
    ///
    /// Becomes the object's registry key.
    fn key(&self) -> &str;

    /// Identifier of the device family, such as `accu_chek`.
    fn device_id(&self) -> String;

    /// Where the device's data comes in from.
    fn source_type(&self) -> SourceType;

    /// Category of the device.
    fn device_type(&self) -> DeviceType;

    /// Model name of the device.
    fn device_model(&self) -> String;

    /// Bluetooth name, once known.
    fn bluetooth_name(&self) -> Option<String>;

    /// Bluetooth MAC address, once known.
    fn bluetooth_mac_address(&self) -> Option<String>;

    /// Whether the device has to be bonded before it delivers data.
    fn needs_pairing(&self) -> bool;

    // --- Matching and behavior ---

    /// Only connect to peripherals advertising one of these names.
    async fn set_match_names(&self, names: Vec<String>) -> Result<()>;

    /// Only connect to peripherals with one of these MAC addresses.
    async fn set_match_mac_addresses(&self, addresses: Vec<String>) -> Result<()>;

    /// Synchronize the device clock on connection.
    async fn set_auto_time_sync(&self, enabled: bool) -> Result<()>;

    /// Enable notifications automatically on connection.
    async fn set_auto_notify(&self, enabled: bool) -> Result<()>;

    /// Restrict which kinds an auto-detecting device may match.
    ///
    /// `None` clears the filter. Only meaningful for [`DeviceKind::Auto`]
    /// devices; the registry rejects the call for every other kind before it
    /// reaches the device.
    async fn set_filter_by_kinds(&self, kinds: Option<Vec<DeviceKind>>) -> Result<()>;

    // --- Connection ---

    /// Disconnect from the device.
    async fn disconnect(&self) -> Result<()>;

    // --- Streams ---

    /// Open a stream of raw connection state names.
    fn connection_state_stream(&self) -> RawStream;

    /// Open a stream of decoded samples, serialized as JSON text.
    fn data_stream(&self) -> RawStream;
}

/// Scanner that owns the set of devices being looked for.
#[async_trait]
pub trait DeviceScanner: Send + Sync {
    /// Open a stream of raw scanner state names.
    fn state_stream(&self) -> RawStream;

    /// Pass the host's session key on to the backend.
    async fn set_session_key(&self, session_key: &str) -> Result<()>;

    /// Add a device to the scan set.
    async fn add_device(&self, device: Arc<dyn MedicalDevice>) -> Result<()>;

    /// Remove a device from the scan set.
    ///
    /// Removing a device that is not in the set is not an error.
    async fn remove_device(&self, device: Arc<dyn MedicalDevice>) -> Result<()>;

    /// Remove every device from the scan set.
    async fn clear_devices(&self) -> Result<()>;

    /// Start scanning.
    async fn start(&self) -> Result<()>;

    /// Stop scanning.
    async fn stop(&self) -> Result<()>;
}

/// Factory that creates device objects by kind.
pub trait DeviceFactory: Send + Sync {
    /// Create a device of `kind`, or `None` if this factory cannot build it.
    fn create(&self, kind: DeviceKind) -> Option<Arc<dyn MedicalDevice>>;
}
