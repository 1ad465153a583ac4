//! Bridge configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use medlink_types::EnvMode;

use crate::error::Error;

/// File name looked up in the working directory by [`BridgeConfig::load_default`].
pub const DEFAULT_CONFIG_FILE: &str = "medlink.toml";

/// Default capacity of the command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Backend environment selected at startup.
    pub env_mode: EnvMode,
    /// Session key handed to the scanner at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Number of commands that may wait for the dispatcher.
    pub command_capacity: usize,
    /// Add every newly created device to the scan set.
    pub scan_on_create: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            env_mode: EnvMode::default(),
            session_key: None,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            scan_on_create: false,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from [`DEFAULT_CONFIG_FILE`] in the working
    /// directory, falling back to defaults when it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - `command_capacity` is at least 1
    /// - `session_key`, when present, is not empty
    ///
    /// # Example
    ///
    /// ```
    /// use medlink_core::BridgeConfig;
    ///
    /// let config = BridgeConfig::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.command_capacity == 0 {
            errors.push(ValidationError {
                field: "command_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self
            .session_key
            .as_deref()
            .is_some_and(|key| key.trim().is_empty())
        {
            errors.push(ValidationError {
                field: "session_key".to_string(),
                message: "must not be empty when set".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BridgeConfig::default();
        assert_eq!(config.env_mode, EnvMode::Prod);
        assert_eq!(config.command_capacity, 64);
        assert!(config.session_key.is_none());
        assert!(!config.scan_on_create);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BridgeConfig = toml::from_str(r#"env_mode = "dev""#).unwrap();
        assert_eq!(config.env_mode, EnvMode::Dev);
        assert_eq!(config.command_capacity, DEFAULT_COMMAND_CAPACITY);
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            env_mode = "prod"
            session_key = "abc123"
            command_capacity = 8
            scan_on_create = true
        "#;
        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.session_key.as_deref(), Some("abc123"));
        assert_eq!(config.command_capacity, 8);
        assert!(config.scan_on_create);
    }

    #[test]
    fn test_unknown_env_mode_fails_to_parse() {
        let result: Result<BridgeConfig, _> = toml::from_str(r#"env_mode = "staging""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let config = BridgeConfig {
            command_capacity: 0,
            session_key: Some("  ".to_string()),
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["command_capacity", "session_key"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("medlink.toml");

        let config = BridgeConfig {
            env_mode: EnvMode::Dev,
            session_key: Some("key".to_string()),
            command_capacity: 16,
            scan_on_create: true,
        };
        config.save(&config_path).unwrap();

        let loaded = BridgeConfig::load_validated(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = BridgeConfig::load("/nonexistent/path/medlink.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = BridgeConfig::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_error_into_core_error() {
        let err: Error = ConfigError::Validation(vec![ValidationError {
            field: "command_capacity".to_string(),
            message: "must be at least 1".to_string(),
        }])
        .into();
        assert!(matches!(err, Error::InvalidConfig(ref m) if m.contains("command_capacity")));
    }
}
