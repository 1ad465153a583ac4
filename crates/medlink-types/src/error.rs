//! Error types for parsing and normalization in medlink-types.

use thiserror::Error;

/// Errors that can occur when normalizing values handed over by a device
/// collaborator.
///
/// This error type is transport-agnostic; registry and command errors live
/// in medlink-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A state string is outside the closed vocabulary for its stream.
    #[error("Unrecognized {vocabulary} state: '{raw}'")]
    UnrecognizedState {
        /// Which vocabulary was being matched (e.g. "scanner").
        vocabulary: &'static str,
        /// The raw value as received.
        raw: String,
    },

    /// The identifier does not name a supported device kind.
    #[error("Unknown device kind: '{0}'")]
    UnknownDeviceKind(String),

    /// The identifier does not name a supported measurement unit.
    #[error("Unknown measurement unit: '{0}'")]
    UnknownUnit(String),

    /// A data payload could not be decoded for the given kind.
    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Device kind the payload was decoded for.
        kind: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Conversion between units of different dimensions was requested.
    #[error("Cannot convert {from} to {to}: units measure different quantities")]
    IncompatibleUnits {
        /// Source unit identifier.
        from: String,
        /// Target unit identifier.
        to: String,
    },

    /// A value is outside its valid domain.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ParseError {
    /// Create an unrecognized-state error.
    pub fn unrecognized_state(vocabulary: &'static str, raw: impl Into<String>) -> Self {
        Self::UnrecognizedState {
            vocabulary,
            raw: raw.into(),
        }
    }

    /// Create an invalid-payload error.
    pub fn invalid_payload(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using medlink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
