//! Exec command implementation.
//!
//! Reads one JSON command per line, such as
//! `{"op": "createDevice", "kind": "wellue"}`, runs it against a bridge over
//! mock collaborators and prints one JSON result per line. Blank lines and
//! lines starting with `#` are skipped.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use medlink_core::{
    BridgeConfig, Command, CommandError, CommandValue, ErrorKind, EventFilter, EventReceiver,
    TypedEvent,
};
use serde::Serialize;

use crate::util::{start_mock_bridge, write_output};

/// Idle time after a command before its events are considered complete.
const EVENT_SETTLE_TIME: Duration = Duration::from_millis(25);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecRecord {
    line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    op: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<CommandValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<CommandError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<TypedEvent>,
}

pub async fn cmd_exec(
    config: BridgeConfig,
    file: Option<&PathBuf>,
    show_events: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    let reader: Box<dyn Read> = match file {
        Some(path) => Box::new(
            std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(std::io::stdin()),
    };
    let content = run_script(config, BufReader::new(reader), show_events).await?;
    write_output(output, &content)
}

async fn run_script<R: BufRead>(
    config: BridgeConfig,
    input: R,
    show_events: bool,
) -> Result<String> {
    let session = start_mock_bridge(config).await?;
    let mut rx = show_events.then(|| session.bridge.subscribe(EventFilter::All));

    let mut content = String::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.context("Failed to read command")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut record = ExecRecord {
            line: index + 1,
            op: None,
            result: None,
            error: None,
            events: Vec::new(),
        };
        match serde_json::from_str::<Command>(trimmed) {
            Ok(command) => {
                record.op = Some(command.name());
                match session.bridge.commands().call(command).await {
                    Ok(value) => record.result = Some(value),
                    Err(e) => record.error = Some(e),
                }
            }
            Err(e) => {
                record.error = Some(CommandError::new(
                    ErrorKind::InvalidArgument,
                    format!("Unrecognized command: {e}"),
                ));
            }
        }
        if let Some(rx) = rx.as_mut() {
            record.events = settle(rx).await;
        }

        content.push_str(&serde_json::to_string(&record)?);
        content.push('\n');
    }

    session.bridge.shutdown().await;
    Ok(content)
}

async fn settle(rx: &mut EventReceiver) -> Vec<TypedEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(EVENT_SETTLE_TIME, rx.recv()).await {
        events.push(event);
    }
    events
}
