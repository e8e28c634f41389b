//! End-to-end charging session tests through the engine.

use chrono::{NaiveDate, NaiveDateTime};
use voltrace::config::{EngineConfig, EnrichmentSettings};
use voltrace::{Database, RawReading, TelemetryEngine};

fn ts(s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(22, 0, 0)
        .unwrap()
        + chrono::Duration::seconds(s as i64)
}

fn raw(vehicle: &str, s: u32, speed: f64, soc: f64) -> RawReading {
    RawReading {
        vehicle_id: Some(vehicle.to_string()),
        timestamp: Some(ts(s).format("%Y-%m-%dT%H:%M:%S").to_string()),
        speed_kmh: Some(speed),
        soc_pct: Some(soc),
        ..Default::default()
    }
}

fn engine() -> TelemetryEngine {
    let config = EngineConfig {
        enrichment: EnrichmentSettings {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let db = Database::open_in_memory().expect("in-memory database");
    TelemetryEngine::new(config, db)
}

/// Open a session with a sustained stationary SOC rise 40 -> 48.
async fn charge_to_48(engine: &TelemetryEngine) {
    engine.ingest(&raw("veh-1", 0, 0.0, 40.0)).await.unwrap();
    engine.ingest(&raw("veh-1", 60, 0.0, 42.0)).await.unwrap();
    engine.ingest(&raw("veh-1", 120, 0.0, 45.0)).await.unwrap();
    engine.ingest(&raw("veh-1", 180, 0.0, 48.0)).await.unwrap();
}

#[tokio::test]
async fn plateau_past_grace_closes_session() {
    let engine = engine();
    charge_to_48(&engine).await;

    // Plateau within grace keeps the session open; past it, close
    engine.ingest(&raw("veh-1", 240, 0.0, 48.0)).await.unwrap();
    engine.ingest(&raw("veh-1", 600, 0.0, 48.0)).await.unwrap();

    let db = engine.database();
    let db = db.lock().await;
    let sessions = db.list_charging_sessions("veh-1", None, None).unwrap();
    assert_eq!(sessions.len(), 1);

    let session = &sessions[0];
    // Anchored at the reading where charging actually began
    assert_eq!(session.started_at, ts(0));
    assert_eq!(session.start_soc_pct, 40.0);
    assert_eq!(session.end_soc_pct, Some(48.0));
    assert!(session.complete);
    // 8% of a 16 kWh pack
    assert!((session.energy_added_kwh.unwrap() - 1.28).abs() < 1e-9);
}

#[tokio::test]
async fn motion_closes_session_before_any_trip_opens() {
    let engine = engine();
    charge_to_48(&engine).await;

    // Driving off: the same reading cannot both close the session and
    // open a trip
    engine.ingest(&raw("veh-1", 240, 30.0, 48.0)).await.unwrap();

    let db = engine.database();
    let db = db.lock().await;
    assert_eq!(db.count_charging_sessions("veh-1").unwrap(), 1);
    assert_eq!(db.count_trips("veh-1").unwrap(), 0);
    drop(db);

    // The next qualifying reading opens the trip
    engine.ingest(&raw("veh-1", 300, 30.0, 48.0)).await.unwrap();
    engine.sweep_once(ts(300 + 700)).await.unwrap();

    let db = engine.database();
    let db = db.lock().await;
    let trips = db.list_trips("veh-1", None, None).unwrap();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].started_at, ts(300));
}

#[tokio::test]
async fn stale_session_force_closed_by_sweep() {
    let engine = engine();
    charge_to_48(&engine).await;

    // Telemetry dies mid-charge; only the sweep can reconcile
    let report = engine.sweep_once(ts(180 + 1801)).await.unwrap();
    assert_eq!(report.sessions_closed, 1);

    let db = engine.database();
    let db = db.lock().await;
    let sessions = db.list_charging_sessions("veh-1", None, None).unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(!sessions[0].complete);
    assert_eq!(sessions[0].ended_at, Some(ts(180)));
    drop(db);

    // Idempotent: no duplicate on a later pass
    let report = engine.sweep_once(ts(180 + 4000)).await.unwrap();
    assert_eq!(report.sessions_closed, 0);
    let db = engine.database();
    assert_eq!(db.lock().await.count_charging_sessions("veh-1").unwrap(), 1);
}

#[tokio::test]
async fn soc_jitter_never_opens_a_session() {
    let engine = engine();

    // Noise-level wiggles while parked
    engine.ingest(&raw("veh-1", 0, 0.0, 40.0)).await.unwrap();
    engine.ingest(&raw("veh-1", 60, 0.0, 40.5)).await.unwrap();
    engine.ingest(&raw("veh-1", 120, 0.0, 40.2)).await.unwrap();
    engine.ingest(&raw("veh-1", 180, 0.0, 40.8)).await.unwrap();

    engine.sweep_once(ts(180 + 3600)).await.unwrap();

    let db = engine.database();
    let db = db.lock().await;
    assert_eq!(db.count_charging_sessions("veh-1").unwrap(), 0);
    assert_eq!(db.count_trips("veh-1").unwrap(), 0);
}
