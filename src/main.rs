//! Voltrace - Plug-in Hybrid Telemetry Trip Engine
//!
//! Replay entry point: feeds a JSONL file of raw readings through the
//! engine, runs a final sweep and prints per-vehicle totals.

use std::collections::BTreeSet;
use std::io::BufRead;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voltrace::engine::EngineError;
use voltrace::sweep::StreamSweeper;
use voltrace::{config, Database, RawReading, TelemetryEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Voltrace v{}", env!("CARGO_PKG_VERSION"));

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("Usage: voltrace <readings.jsonl>"))?;

    let engine_config = config::load_config()?;
    if !config::get_config_path().exists() {
        // First run: write the defaults out so they can be edited
        config::save_config(&engine_config)?;
        tracing::info!("Wrote default config to {}", config::get_config_path().display());
    }

    let db_path = config::get_data_dir().join("voltrace.db");
    let database = Database::open(&db_path)?;
    tracing::info!("Database at {}", db_path.display());

    // Staleness is measured on the stream's own clock: the log is
    // historical, so the wall clock says nothing about what was stale.
    let mut sweeper = StreamSweeper::new(engine_config.sweep_interval_secs);
    let final_horizon_secs = engine_config
        .trip_timeout_secs
        .max(engine_config.charging_timeout_secs) as i64
        + 1;

    let engine = TelemetryEngine::new(engine_config, database);

    let file = std::fs::File::open(&path)
        .map_err(|e| anyhow::anyhow!("Cannot open {}: {}", path, e))?;
    let reader = std::io::BufReader::new(file);

    let mut vehicles: BTreeSet<String> = BTreeSet::new();
    let mut accepted: u64 = 0;
    let mut rejected: u64 = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: RawReading = match serde_json::from_str(&line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Line {}: unparseable reading: {}", line_no + 1, e);
                rejected += 1;
                continue;
            }
        };

        if let Some(id) = raw.vehicle_id.as_deref() {
            vehicles.insert(id.to_string());
        }

        match engine.ingest(&raw).await {
            Ok(()) => accepted += 1,
            Err(EngineError::Validation(e)) => {
                tracing::warn!("Line {}: rejected reading: {}", line_no + 1, e);
                rejected += 1;
            }
            // Persistence is the only fatal failure
            Err(e @ EngineError::Storage(_)) => return Err(e.into()),
        }

        if let Some(now) = engine.stream_time() {
            sweeper.advance(&engine, now).await?;
        }
    }

    // Close out whatever the stream left open: one sweep past every
    // timeout, still on the stream clock
    if let Some(stream_end) = engine.stream_time() {
        let report = engine
            .sweep_once(stream_end + chrono::Duration::seconds(final_horizon_secs))
            .await?;
        if report.trips_closed > 0 || report.sessions_closed > 0 {
            tracing::info!(
                "Final sweep closed {} trip(s), {} session(s)",
                report.trips_closed,
                report.sessions_closed
            );
        }
    }

    tracing::info!("Replay complete: {} accepted, {} rejected", accepted, rejected);

    let db = engine.database();
    let db = db.lock().await;
    for vehicle in &vehicles {
        let trips = db.count_trips(vehicle)?;
        let sessions = db.count_charging_sessions(vehicle)?;
        tracing::info!("{}: {} trip(s), {} charging session(s)", vehicle, trips, sessions);
    }

    Ok(())
}
