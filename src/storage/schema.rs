//! Database schema definitions for Voltrace.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Trips table
CREATE TABLE IF NOT EXISTS trips (
    id TEXT PRIMARY KEY,
    vehicle_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    closed INTEGER NOT NULL DEFAULT 0,
    last_update TEXT NOT NULL,
    distance_m REAL NOT NULL DEFAULT 0,
    gas_mpg REAL,
    electric_miles REAL NOT NULL DEFAULT 0,
    electric_kwh REAL NOT NULL DEFAULT 0,
    kwh_per_mile REAL,
    soc_floor_pct REAL,
    soc_floor_at TEXT,
    avg_ambient_temp_c REAL,
    complete INTEGER NOT NULL DEFAULT 0,
    weather_temp_c REAL,
    weather_conditions TEXT,
    elevation_gain_m REAL,
    elevation_loss_m REAL,
    enrichment TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trips_vehicle_id ON trips(vehicle_id);
CREATE INDEX IF NOT EXISTS idx_trips_started_at ON trips(started_at);

-- Mode segments table
CREATE TABLE IF NOT EXISTS mode_segments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id TEXT NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    mode TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_mode_segments_trip_id ON mode_segments(trip_id);

-- Fuel events table
CREATE TABLE IF NOT EXISTS fuel_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id TEXT NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    timestamp TEXT NOT NULL,
    kind TEXT NOT NULL,
    magnitude_pct REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fuel_events_trip_id ON fuel_events(trip_id);

-- SOC transitions table
CREATE TABLE IF NOT EXISTS soc_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id TEXT NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    timestamp TEXT NOT NULL,
    soc_before_pct REAL NOT NULL,
    soc_after_pct REAL NOT NULL,
    kind TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_soc_transitions_trip_id ON soc_transitions(trip_id);

-- Charging sessions table
CREATE TABLE IF NOT EXISTS charging_sessions (
    id TEXT PRIMARY KEY,
    vehicle_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    closed INTEGER NOT NULL DEFAULT 0,
    last_update TEXT NOT NULL,
    start_soc_pct REAL NOT NULL,
    end_soc_pct REAL,
    energy_added_kwh REAL,
    complete INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_charging_sessions_vehicle_id ON charging_sessions(vehicle_id);
CREATE INDEX IF NOT EXISTS idx_charging_sessions_started_at ON charging_sessions(started_at);
"#;

/// SQL for schema version tracking (migrations)
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;
