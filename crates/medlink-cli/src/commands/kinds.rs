//! Kinds command implementation.

use std::path::PathBuf;

use anyhow::Result;
use medlink_core::{MedicalDevice, MockDevice};
use medlink_types::DeviceKind;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::util::write_output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KindInfo {
    kind: DeviceKind,
    device_type: String,
    source_type: String,
    model: String,
    needs_pairing: bool,
}

fn kind_info(kind: DeviceKind) -> KindInfo {
    let device = MockDevice::new(kind);
    KindInfo {
        kind,
        device_type: device.device_type().to_string(),
        source_type: device.source_type().to_string(),
        model: device.device_model(),
        needs_pairing: device.needs_pairing(),
    }
}

pub fn cmd_kinds(format: OutputFormat, output: Option<&PathBuf>) -> Result<()> {
    let kinds: Vec<_> = DeviceKind::ALL.into_iter().map(kind_info).collect();

    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&kinds)? + "\n",
        OutputFormat::Text => {
            let mut out = format!(
                "{:<14} {:<24} {:<16} {}\n",
                "KIND", "DEVICE TYPE", "MODEL", "PAIRING"
            );
            for info in &kinds {
                out.push_str(&format!(
                    "{:<14} {:<24} {:<16} {}\n",
                    info.kind.as_str(),
                    info.device_type,
                    info.model,
                    if info.needs_pairing { "required" } else { "-" }
                ));
            }
            out
        }
    };

    write_output(output, &content)
}
