//! Core bridge between a host application and medical device collaborators.
//!
//! This crate sits between a command-issuing host and the concrete device and
//! scanner implementations. It exposes devices as opaque string keys, routes
//! the raw values they stream into typed events, and executes host commands
//! with per-request result correlation.
//!
//! # Features
//!
//! - **Handle registry**: Create, look up and tear down devices by key
//! - **Event routing**: Scanner state, connection state and data samples,
//!   each tagged with the producing key
//! - **Command dispatch**: Every operation resolves exactly its own caller
//! - **Scan control**: Scan set and scanner start/stop
//! - **Environment selection**: `prod` or `dev` backend
//! - **Unit conversion**: Glucose, mass, length, temperature and more
//!
//! # Supported Devices
//!
//! | Kind | Device type | Data |
//! |------|-------------|------|
//! | `accu_chek` | Blood glucose meter | Glucose readings |
//! | `lepu_medical` | Pulse oximeter | SpO₂, pulse rate |
//! | `wellue` | Pulse oximeter | SpO₂, pulse rate |
//! | `yuwell` | Blood pressure monitor | Systolic, diastolic, pulse |
//! | `auto` | Any of the above | Tagged by the detected kind |
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use medlink_core::{Bridge, BridgeConfig, Collaborators, EventFilter};
//! use medlink_core::mock::{MockDeviceFactory, MockScanner};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let collaborators = Collaborators::new(
//!     Arc::new(MockScanner::new()),
//!     Arc::new(MockDeviceFactory::new()),
//! );
//! let bridge = Bridge::new(collaborators, BridgeConfig::default()).await?;
//!
//! let key = bridge.commands().create_device("wellue").await?;
//! let mut events = bridge.subscribe(EventFilter::Device(key.clone()));
//! println!("Model: {}", bridge.commands().get_device_model(key.as_str()).await?);
//!
//! bridge.commands().delete_device(key.as_str()).await?;
//! assert!(events.try_recv().is_none());
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod events;
pub mod mock;
pub mod registry;
pub mod router;
pub mod scanner;
pub mod traits;
mod util;

// Re-export the shared vocabulary
pub use medlink_types as types;

// Core exports
pub use bridge::{Bridge, Collaborators};
pub use config::{BridgeConfig, ConfigError, ValidationError};
pub use dispatcher::{
    Command, CommandContext, CommandOutcome, CommandValue, Dispatcher, DispatcherHandle,
    PendingResults, RequestId,
};
pub use env::EnvSelector;
pub use error::{CommandError, Error, ErrorKind, Result};
pub use events::{EventDispatcher, EventFilter, EventReceiver, TypedEvent};
pub use mock::{MockCallLog, MockDevice, MockDeviceBuilder, MockDeviceFactory, MockScanner};
pub use registry::{DeviceHandle, HandleGuard, Registry, RegistryKey};
pub use router::{DeliveryGate, EventRouter, Subscription};
pub use scanner::ScannerFacade;
pub use traits::{DeviceFactory, DeviceScanner, MedicalDevice, RawStream};

// Re-export from medlink-types
pub use medlink_types::{
    ConnectionState, DeviceKind, DevicePayload, DeviceType, EnvMode, MeasurementUnit,
    ScannerState, SourceType,
};
