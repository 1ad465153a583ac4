//! Config command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use medlink_core::BridgeConfig;

use crate::util::write_output;

pub fn cmd_config(
    config: &BridgeConfig,
    save: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    if let Some(path) = save {
        config
            .save(path)
            .with_context(|| format!("Failed to save config to {}", path.display()))?;
        tracing::info!("Saved configuration to {}", path.display());
    }
    let content = config.to_toml().context("Failed to render config")?;
    write_output(output, &content)
}
