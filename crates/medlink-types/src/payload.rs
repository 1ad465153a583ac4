//! Structured data records published by devices.
//!
//! Collaborators hand over decoded samples as JSON text. [`DevicePayload::decode`]
//! turns that text into a closed set of records, chosen by the kind of the
//! handle that produced it rather than by inspecting the value.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ParseError;
use crate::types::DeviceKind;

/// One Accu-Chek record exactly as the meter reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuChekRawReading {
    /// Time in milliseconds since epoch.
    pub time_milliseconds: i64,
    /// Corrected time in milliseconds since epoch.
    pub corrected_time_milliseconds: i64,
    pub has_time_offset: bool,
    pub has_glucose: bool,
    /// Glucose units flag as reported by the meter.
    pub units: i32,
    pub has_status: bool,
    pub has_context: bool,
    pub sequence_number: i64,
    /// Offset in minutes from original time to corrected time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_offset_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glucose_millimoles_per_liter: Option<f64>,
    /// Raw record in hexadecimal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_hex: Option<String>,
}

/// A single glucose sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlucoseReading {
    /// Time in milliseconds since epoch.
    pub time_milliseconds: i64,
    /// Blood glucose level in mmol/L.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glucose_millimoles_per_liter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data_reading: Option<AccuChekRawReading>,
}

/// A batch of glucose samples (Accu-Chek).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlucoseData {
    pub readings: Vec<GlucoseReading>,
}

/// SpO2 / pulse / perfusion triple (Lepu Medical, Wellue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OximetryData {
    /// Time in milliseconds since epoch.
    pub time_milliseconds: i64,
    /// SpO2 in percent, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_rate_beats_per_minute: Option<f64>,
    /// Perfusion index in percent, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perfusion_index_percentage: Option<f64>,
}

/// Progress of a blood pressure measurement.
///
/// Besides the names, older firmware reports the numeric codes `1`, `2` and
/// `3`; both forms are accepted when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementState {
    /// Measuring in progress.
    Measuring,
    /// Measurement has completed successfully.
    Success,
    /// An error occurred during measurement.
    Error,
}

impl MeasurementState {
    /// Normalize a raw state, ignoring ASCII case.
    ///
    /// ```
    /// use medlink_types::MeasurementState;
    ///
    /// assert_eq!(MeasurementState::from_raw("SUCCESS"), Ok(MeasurementState::Success));
    /// assert_eq!(MeasurementState::from_raw("3"), Ok(MeasurementState::Error));
    /// ```
    pub fn from_raw(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        let state = if raw.eq_ignore_ascii_case("measuring") || raw == "1" {
            MeasurementState::Measuring
        } else if raw.eq_ignore_ascii_case("success") || raw == "2" {
            MeasurementState::Success
        } else if raw.eq_ignore_ascii_case("error") || raw == "3" {
            MeasurementState::Error
        } else {
            return Err(ParseError::unrecognized_state("measurement", raw));
        };
        Ok(state)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementState::Measuring => "measuring",
            MeasurementState::Success => "success",
            MeasurementState::Error => "error",
        }
    }
}

impl fmt::Display for MeasurementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MeasurementState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            // Some bridges encode the legacy codes as floats, e.g. `2.0`.
            Float(f64),
            Text(String),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Code(code) => code.to_string(),
            Raw::Float(code) if code.is_finite() && code.fract() == 0.0 => {
                (code as i64).to_string()
            }
            Raw::Float(code) => {
                return Err(serde::de::Error::custom(format!(
                    "measurement state code {code} is not a whole number"
                )));
            }
            Raw::Text(text) => text,
        };
        MeasurementState::from_raw(&raw).map_err(serde::de::Error::custom)
    }
}

/// Blood pressure quad plus measurement state (Yuwell).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodPressureData {
    pub state: MeasurementState,
    /// Time in milliseconds since epoch.
    pub time_milliseconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systolic_millimeters_of_mercury: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diastolic_millimeters_of_mercury: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arterial_millimeters_of_mercury: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_rate_beats_per_minute: Option<f64>,
}

/// Data from an auto-detecting device, tagged with the detected kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoData {
    /// Kind the device was detected as. Never [`DeviceKind::Auto`].
    pub device_id: DeviceKind,
    pub data: Box<DevicePayload>,
}

/// Decoded payload of a `device.data` event.
///
/// Serializes as the kind-specific JSON object without an extra tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DevicePayload {
    Glucose(GlucoseData),
    Oximetry(OximetryData),
    BloodPressure(BloodPressureData),
    Auto(AutoData),
}

impl DevicePayload {
    /// Decode the JSON text a device of `kind` published.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] when the text is not valid JSON
    /// for the kind's record, or when an auto-detected wrapper names an
    /// unknown kind or nests another auto detection.
    ///
    /// ```
    /// use medlink_types::{DeviceKind, DevicePayload, MeasurementState};
    ///
    /// let payload = DevicePayload::decode(
    ///     DeviceKind::Yuwell,
    ///     r#"{"state": 2, "timeMilliseconds": 0, "systolicMillimetersOfMercury": 120}"#,
    /// ).unwrap();
    /// match payload {
    ///     DevicePayload::BloodPressure(bp) => assert_eq!(bp.state, MeasurementState::Success),
    ///     other => panic!("unexpected payload: {other:?}"),
    /// }
    /// ```
    pub fn decode(kind: DeviceKind, json: &str) -> Result<Self, ParseError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ParseError::invalid_payload(kind.as_str(), e.to_string()))?;
        Self::decode_value(kind, value)
    }

    /// Decode an already-parsed JSON value for `kind`.
    pub fn decode_value(kind: DeviceKind, value: serde_json::Value) -> Result<Self, ParseError> {
        let invalid =
            |e: serde_json::Error| ParseError::invalid_payload(kind.as_str(), e.to_string());
        match kind {
            DeviceKind::AccuChek => serde_json::from_value(value)
                .map(DevicePayload::Glucose)
                .map_err(invalid),
            DeviceKind::LepuMedical | DeviceKind::Wellue => serde_json::from_value(value)
                .map(DevicePayload::Oximetry)
                .map_err(invalid),
            DeviceKind::Yuwell => serde_json::from_value(value)
                .map(DevicePayload::BloodPressure)
                .map_err(invalid),
            DeviceKind::Auto => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Detected {
                    device_id: String,
                    data: serde_json::Value,
                }

                let detected: Detected = serde_json::from_value(value).map_err(invalid)?;
                let detected_kind: DeviceKind = detected
                    .device_id
                    .parse()
                    .map_err(|e: ParseError| ParseError::invalid_payload("auto", e.to_string()))?;
                if detected_kind == DeviceKind::Auto {
                    return Err(ParseError::invalid_payload(
                        "auto",
                        "detected kind cannot itself be auto",
                    ));
                }
                let inner = Self::decode_value(detected_kind, detected.data)?;
                Ok(DevicePayload::Auto(AutoData {
                    device_id: detected_kind,
                    data: Box::new(inner),
                }))
            }
        }
    }

    /// The kind whose record this payload carries, looking through auto wrappers.
    #[must_use]
    pub fn record_kind(&self) -> &'static str {
        match self {
            DevicePayload::Glucose(_) => "glucose",
            DevicePayload::Oximetry(_) => "oximetry",
            DevicePayload::BloodPressure(_) => "blood_pressure",
            DevicePayload::Auto(auto) => auto.data.record_kind(),
        }
    }
}
