//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use medlink_core::mock::{MockDeviceFactory, MockScanner};
use medlink_core::{Bridge, BridgeConfig, Collaborators, TypedEvent};

/// Load the bridge configuration from `path`, or from `medlink.toml` in the
/// working directory when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::load_default().context("Failed to load medlink.toml")?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Mock collaborators plus a bridge running over them.
pub struct MockSession {
    pub bridge: Bridge,
    pub scanner: Arc<MockScanner>,
    pub factory: Arc<MockDeviceFactory>,
}

/// Start a bridge over fresh mock collaborators.
pub async fn start_mock_bridge(config: BridgeConfig) -> Result<MockSession> {
    let scanner = Arc::new(MockScanner::new());
    let factory = Arc::new(MockDeviceFactory::new());
    let bridge = Bridge::new(
        Collaborators::new(scanner.clone(), factory.clone()),
        config,
    )
    .await
    .context("Failed to start bridge")?;
    Ok(MockSession {
        bridge,
        scanner,
        factory,
    })
}

/// One-line human-readable rendering of an event.
pub fn format_event_text(event: &TypedEvent) -> Result<String> {
    Ok(match event {
        TypedEvent::ScannerStateChanged { state } => {
            format!("[{}] {}", event.channel(), state)
        }
        TypedEvent::DeviceConnectionChanged { key, state } => {
            format!("[{}] {} {}", event.channel(), key, state)
        }
        TypedEvent::DeviceDataReceived { key, payload } => {
            format!(
                "[{}] {} {} {}",
                event.channel(),
                key,
                payload.record_kind(),
                serde_json::to_string(payload)?
            )
        }
    })
}

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use medlink_core::RegistryKey;
    use medlink_types::{ConnectionState, DeviceKind, DevicePayload, ScannerState};

    #[test]
    fn test_format_scanner_event() {
        let event = TypedEvent::ScannerStateChanged {
            state: ScannerState::Started,
        };
        assert_eq!(format_event_text(&event).unwrap(), "[scanner.state] started");
    }

    #[test]
    fn test_format_connection_event() {
        let event = TypedEvent::DeviceConnectionChanged {
            key: RegistryKey::new("abc"),
            state: ConnectionState::Paired,
        };
        assert_eq!(
            format_event_text(&event).unwrap(),
            "[device.connectionState] abc paired"
        );
    }

    #[test]
    fn test_format_data_event() {
        let payload = DevicePayload::decode(
            DeviceKind::Wellue,
            r#"{"timeMilliseconds": 5, "spo2Percentage": 98}"#,
        )
        .unwrap();
        let event = TypedEvent::DeviceDataReceived {
            key: RegistryKey::new("abc"),
            payload,
        };
        let text = format_event_text(&event).unwrap();
        assert!(text.starts_with("[device.data] abc oximetry {"));
        assert!(text.contains("\"spo2Percentage\":98"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medlink.toml");
        std::fs::write(&path, "env_mode = \"dev\"\nscan_on_create = true\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.env_mode, medlink_types::EnvMode::Dev);
        assert!(config.scan_on_create);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medlink.toml");
        std::fs::write(&path, "command_capacity = 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
