//! Platform-agnostic types for the medlink medical device bridge.
//!
//! This crate provides the shared vocabulary used by the bridge core
//! (medlink-core) and by anything sitting on either side of it.
//!
//! # Features
//!
//! - Device kinds, source and device categories
//! - Scanner and connection state vocabularies with lenient normalization
//! - Typed data payloads for glucose, oximetry and blood pressure devices
//! - Measurement units and unit conversion
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use medlink_types::{ConnectionState, DeviceKind, DevicePayload};
//!
//! let state = ConnectionState::from_raw("CONNECTED").unwrap();
//! assert_eq!(state, ConnectionState::Connected);
//!
//! let json = r#"{"timeMilliseconds": 0, "spo2Percentage": 98}"#;
//! let payload = DevicePayload::decode(DeviceKind::Wellue, json).unwrap();
//! assert_eq!(payload.record_kind(), "oximetry");
//! ```

pub mod error;
pub mod payload;
pub mod types;
pub mod units;

pub use error::{ParseError, ParseResult};
pub use payload::{
    AccuChekRawReading, AutoData, BloodPressureData, DevicePayload, GlucoseData, GlucoseReading,
    MeasurementState, OximetryData,
};
pub use types::{ConnectionState, DeviceKind, DeviceType, EnvMode, ScannerState, SourceType};
pub use units::{Dimension, MeasurementUnit, convert_unit};
