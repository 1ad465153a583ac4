//! Simulate command implementation.
//!
//! Drives a bridge over mock collaborators through a complete session:
//! create devices, scan, connect, stream samples, disconnect and tear down.
//! Every event the bridge publishes is printed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use medlink_core::{BridgeConfig, EventFilter, EventReceiver, MedicalDevice};
use medlink_types::DeviceKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::OutputFormat;
use crate::util::{format_event_text, start_mock_bridge, write_output};

/// How long the event stream must stay idle before the session is over.
const SETTLE_TIME: Duration = Duration::from_millis(100);

pub struct SimulateArgs {
    pub kinds: Vec<String>,
    pub samples: u32,
    pub interval: Duration,
    pub format: OutputFormat,
}

pub async fn cmd_simulate(
    config: BridgeConfig,
    args: SimulateArgs,
    output: Option<&PathBuf>,
) -> Result<()> {
    let session = start_mock_bridge(config).await?;
    let commands = session.bridge.commands();
    let mut rx = session.bridge.subscribe(EventFilter::All);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut devices = Vec::new();
    for kind in &args.kinds {
        let key = commands
            .create_device(kind)
            .await
            .with_context(|| format!("Failed to create '{kind}' device"))?;
        commands
            .set_auto_notify(key.as_str(), true)
            .await
            .context("Failed to enable notifications")?;
        commands
            .add_to_scan(key.as_str())
            .await
            .context("Failed to add device to scan set")?;
        let device = session
            .factory
            .device(key.as_str())
            .context("Factory lost track of a created device")?;
        info!(key = %key, kind = %device.kind(), "Simulating device");
        devices.push(device);
    }

    commands.start_scan().await.context("Failed to start scanning")?;

    for device in &devices {
        device.emit_connection_state("connecting");
        device.emit_connection_state("connected");
        if device.needs_pairing() {
            device.emit_connection_state("paired");
        }
    }

    let mut rng = StdRng::from_rng(&mut rand::rng());
    'samples: for _ in 0..args.samples {
        for device in &devices {
            device.emit_data(&sample_payload(device.kind(), now_millis(), &mut rng).to_string());
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Interrupted, ending session early");
                break 'samples;
            }
            _ = tokio::time::sleep(args.interval) => {}
        }
    }

    for device in &devices {
        device.emit_connection_state("disconnected");
    }
    commands.stop_scan().await.context("Failed to stop scanning")?;

    let mut content = collect_events(&mut rx, args.format).await?;
    let cleared = session.bridge.shutdown().await;
    content.push_str(&collect_events(&mut rx, args.format).await?);

    info!(
        devices = cleared,
        disconnects = session.factory.total_disconnects(),
        scanning = session.scanner.is_running(),
        "Session finished"
    );
    write_output(output, &content)
}

/// Render events until the stream goes quiet.
async fn collect_events(rx: &mut EventReceiver, format: OutputFormat) -> Result<String> {
    let mut content = String::new();
    while let Ok(Some(event)) = tokio::time::timeout(SETTLE_TIME, rx.recv()).await {
        let line = match format {
            OutputFormat::Text => format_event_text(&event)?,
            OutputFormat::Json => {
                let mut value = serde_json::to_value(&event)?;
                if let Value::Object(map) = &mut value {
                    let received_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
                    map.insert("receivedAt".to_string(), Value::String(received_at));
                }
                serde_json::to_string(&value)?
            }
        };
        content.push_str(&line);
        content.push('\n');
    }
    Ok(content)
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A plausible raw data payload for a device of `kind`.
pub(crate) fn sample_payload<R: Rng + ?Sized>(
    kind: DeviceKind,
    time_ms: i64,
    rng: &mut R,
) -> Value {
    match kind {
        DeviceKind::AccuChek => json!({
            "readings": [{
                "timeMilliseconds": time_ms,
                "glucoseMillimolesPerLiter": round1(rng.random_range(4.0..9.0)),
            }]
        }),
        DeviceKind::LepuMedical | DeviceKind::Wellue => json!({
            "timeMilliseconds": time_ms,
            "spo2Percentage": rng.random_range(94..=100),
            "pulseRateBeatsPerMinute": rng.random_range(55..=95),
            "perfusionIndexPercentage": round1(rng.random_range(0.5..5.0)),
        }),
        DeviceKind::Yuwell => {
            let systolic: i32 = rng.random_range(105..=135);
            let diastolic: i32 = rng.random_range(65..=88);
            json!({
                "state": "success",
                "timeMilliseconds": time_ms,
                "systolicMillimetersOfMercury": systolic,
                "diastolicMillimetersOfMercury": diastolic,
                "arterialMillimetersOfMercury": diastolic + (systolic - diastolic) / 3,
                "pulseRateBeatsPerMinute": rng.random_range(55..=95),
            })
        }
        DeviceKind::Auto => json!({
            "deviceId": DeviceKind::Wellue.as_str(),
            "data": sample_payload(DeviceKind::Wellue, time_ms, rng),
        }),
    }
}
