//! Error types for medlink-core.
//!
//! [`Error`] is what the library's Rust API returns. Commands that travel
//! through the dispatcher resolve with a [`CommandError`] instead: a stable
//! [`ErrorKind`] code plus a human-readable message, which is what a host on
//! the other side of the bridge gets to see.
//!
//! | Error | Kind |
//! |-------|------|
//! | [`Error::InvalidEnvMode`] | `INVALID_ENV_MODE` |
//! | [`Error::UnknownDeviceKind`] | `UNKNOWN_DEVICE_KIND` |
//! | [`Error::InvalidHandle`] | `INVALID_HANDLE` |
//! | [`Error::InvalidArgument`], [`Error::InvalidConfig`], [`Error::Parse`] | `INVALID_ARGUMENT` |
//! | [`Error::IncompatibleUnits`] | `INCOMPATIBLE_UNITS` |
//! | [`Error::Collaborator`], [`Error::DuplicateKey`], [`Error::Io`] | `COLLABORATOR` |
//! | [`Error::BridgeClosed`] | `BRIDGE_CLOSED` |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use medlink_types::ParseError;

/// Errors that can occur while operating the bridge.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested environment mode is not one of the accepted values.
    #[error("Please provide a valid env mode: {accepted} (got '{value}')")]
    InvalidEnvMode {
        /// The value as received.
        value: String,
        /// Comma-separated list of accepted values.
        accepted: String,
    },

    /// The factory does not know how to create this kind of device.
    #[error("Unknown device kind: '{0}'")]
    UnknownDeviceKind(String),

    /// No live handle has this key.
    #[error("Invalid device key: '{0}'")]
    InvalidHandle(String),

    /// A command argument failed validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Conversion between units of different dimensions.
    #[error("Cannot convert {from} to {to}: units measure different quantities")]
    IncompatibleUnits {
        /// Source unit identifier.
        from: String,
        /// Target unit identifier.
        to: String,
    },

    /// A collaborator (scanner, factory or device) reported a failure.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The factory handed out a key that already belongs to a live handle.
    #[error("Device key '{0}' is already registered")]
    DuplicateKey(String),

    /// The command dispatcher has shut down.
    #[error("Bridge is closed")]
    BridgeClosed,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Normalization failure from medlink-types.
    #[error(transparent)]
    Parse(ParseError),
}

impl Error {
    /// Create an invalid-env-mode error listing every accepted mode.
    pub fn invalid_env_mode(value: impl Into<String>) -> Self {
        Self::InvalidEnvMode {
            value: value.into(),
            accepted: medlink_types::EnvMode::accepted(),
        }
    }

    /// Create an invalid-handle error.
    pub fn invalid_handle(key: impl Into<String>) -> Self {
        Self::InvalidHandle(key.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a collaborator error.
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// The stable code this error is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidEnvMode { .. } => ErrorKind::InvalidEnvMode,
            Error::UnknownDeviceKind(_) => ErrorKind::UnknownDeviceKind,
            Error::InvalidHandle(_) => ErrorKind::InvalidHandle,
            Error::InvalidArgument(_) | Error::InvalidConfig(_) | Error::Parse(_) => {
                ErrorKind::InvalidArgument
            }
            Error::IncompatibleUnits { .. } => ErrorKind::IncompatibleUnits,
            Error::Collaborator(_) | Error::DuplicateKey(_) | Error::Io(_) => {
                ErrorKind::Collaborator
            }
            Error::BridgeClosed => ErrorKind::BridgeClosed,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnknownDeviceKind(kind) => Error::UnknownDeviceKind(kind),
            ParseError::IncompatibleUnits { from, to } => Error::IncompatibleUnits { from, to },
            other => Error::Parse(other),
        }
    }
}

/// Result type alias using medlink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidEnvMode,
    UnknownDeviceKind,
    InvalidHandle,
    InvalidArgument,
    IncompatibleUnits,
    Collaborator,
    BridgeClosed,
}

impl ErrorKind {
    /// The code as reported to the host.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidEnvMode => "INVALID_ENV_MODE",
            ErrorKind::UnknownDeviceKind => "UNKNOWN_DEVICE_KIND",
            ErrorKind::InvalidHandle => "INVALID_HANDLE",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::IncompatibleUnits => "INCOMPATIBLE_UNITS",
            ErrorKind::Collaborator => "COLLABORATOR",
            ErrorKind::BridgeClosed => "BRIDGE_CLOSED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure outcome of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CommandError {
    /// Stable error code.
    pub kind: ErrorKind,
    /// Human-readable description, echoing the offending input.
    pub message: String,
}

impl CommandError {
    /// Create a command error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The error every caller sees once the dispatcher has shut down.
    pub fn bridge_closed() -> Self {
        Error::BridgeClosed.into()
    }
}

impl From<Error> for CommandError {
    fn from(err: Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
