//! Core vocabulary shared between the bridge and its collaborators.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Kind of measurement device a handle is created for.
///
/// The identifiers are the ones the device factory understands. `Auto`
/// creates a device that detects which of the concrete kinds it is talking
/// to and wraps its data accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Accu-Chek blood glucose meter.
    AccuChek,
    /// Lepu Medical pulse oximeter.
    LepuMedical,
    /// Wellue pulse oximeter.
    Wellue,
    /// Yuwell blood pressure monitor.
    Yuwell,
    /// Auto-detecting device.
    Auto,
}

impl DeviceKind {
    /// All supported kinds, in declaration order.
    pub const ALL: [DeviceKind; 5] = [
        DeviceKind::AccuChek,
        DeviceKind::LepuMedical,
        DeviceKind::Wellue,
        DeviceKind::Yuwell,
        DeviceKind::Auto,
    ];

    /// The identifier used on the command surface.
    ///
    /// ```
    /// use medlink_types::DeviceKind;
    ///
    /// assert_eq!(DeviceKind::AccuChek.as_str(), "accu_chek");
    /// assert_eq!("wellue".parse::<DeviceKind>(), Ok(DeviceKind::Wellue));
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::AccuChek => "accu_chek",
            DeviceKind::LepuMedical => "lepu_medical",
            DeviceKind::Wellue => "wellue",
            DeviceKind::Yuwell => "yuwell",
            DeviceKind::Auto => "auto",
        }
    }
}

impl FromStr for DeviceKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseError::UnknownDeviceKind(s.to_string()))
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a device's data comes in from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Data arrives through a vendor cloud.
    Cloud,
    /// Data arrives over Bluetooth Low Energy.
    BluetoothLowEnergy,
    /// Data is produced by the phone itself.
    MobilePhone,
    /// Source is not known.
    #[default]
    Unknown,
}

impl SourceType {
    /// The identifier used on the command surface.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Cloud => "cloud",
            SourceType::BluetoothLowEnergy => "bluetooth_low_energy",
            SourceType::MobilePhone => "mobile_phone",
            SourceType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    BloodPressureMonitor,
    ContinuousGlucoseMonitor,
    BloodGlucoseMeter,
    MobilePhone,
    PulseOximeter,
    SmartScale,
    SmartWatch,
    Thermometer,
    #[default]
    Unknown,
}

impl DeviceType {
    /// The identifier used on the command surface.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::BloodPressureMonitor => "blood_pressure_monitor",
            DeviceType::ContinuousGlucoseMonitor => "continuous_glucose_monitor",
            DeviceType::BloodGlucoseMeter => "blood_glucose_meter",
            DeviceType::MobilePhone => "mobile_phone",
            DeviceType::PulseOximeter => "pulse_oximeter",
            DeviceType::SmartScale => "smart_scale",
            DeviceType::SmartWatch => "smart_watch",
            DeviceType::Thermometer => "thermometer",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend environment the collaborator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvMode {
    /// Production backend.
    #[default]
    Prod,
    /// Development backend for testing purposes.
    Dev,
}

impl EnvMode {
    /// All accepted modes, in declaration order.
    pub const ALL: [EnvMode; 2] = [EnvMode::Prod, EnvMode::Dev];

    /// The identifier used on the command surface.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvMode::Prod => "prod",
            EnvMode::Dev => "dev",
        }
    }

    /// Comma-separated list of every accepted identifier.
    ///
    /// ```
    /// assert_eq!(medlink_types::EnvMode::accepted(), "prod, dev");
    /// ```
    #[must_use]
    pub fn accepted() -> String {
        EnvMode::ALL
            .iter()
            .map(EnvMode::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for EnvMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prod" => Ok(EnvMode::Prod),
            "dev" => Ok(EnvMode::Dev),
            other => Err(ParseError::InvalidValue(format!(
                "'{other}' is not one of: {}",
                EnvMode::accepted()
            ))),
        }
    }
}

impl fmt::Display for EnvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the device scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerState {
    /// Scanner is spinning up.
    Starting,
    /// Actively scanning for devices.
    Started,
    /// Not scanning for devices.
    Stopped,
}

impl ScannerState {
    /// Normalize a raw collaborator string, ignoring ASCII case.
    ///
    /// ```
    /// use medlink_types::ScannerState;
    ///
    /// assert_eq!(ScannerState::from_raw("STARTED"), Ok(ScannerState::Started));
    /// assert!(ScannerState::from_raw("paused").is_err());
    /// ```
    pub fn from_raw(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        [
            ScannerState::Starting,
            ScannerState::Started,
            ScannerState::Stopped,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(raw))
        .ok_or_else(|| ParseError::unrecognized_state("scanner", raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerState::Starting => "starting",
            ScannerState::Started => "started",
            ScannerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connecting to device.
    Connecting,
    /// Connected to device.
    Connected,
    /// Connected and paired (bonded) with device.
    Paired,
    /// Not connected to device.
    Disconnected,
}

impl ConnectionState {
    /// Normalize a raw collaborator string, ignoring ASCII case.
    ///
    /// ```
    /// use medlink_types::ConnectionState;
    ///
    /// assert_eq!(ConnectionState::from_raw("Paired"), Ok(ConnectionState::Paired));
    /// ```
    pub fn from_raw(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Paired,
            ConnectionState::Disconnected,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(raw))
        .ok_or_else(|| ParseError::unrecognized_state("connection", raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Paired => "paired",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
