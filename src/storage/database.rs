//! Database operations using rusqlite.
//!
//! Closed trips and charging sessions are written here exactly once;
//! enrichment lands later as an idempotent update keyed by entity id.

use crate::enrichment::TripEnrichment;
use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use crate::trip::types::{
    ChargingSession, EnrichmentStatus, FuelEvent, FuelEventKind, ModeSegment, PropulsionMode,
    SocTransition, SocTransitionKind, Trip,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Naive-UTC timestamp format used in every datetime column.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).map_err(|e| {
        DatabaseError::DeserializationError(format!("Invalid timestamp '{}': {}", s, e))
    })
}

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &PathBuf) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::IoError(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let current_version = self.get_schema_version()?;

        if current_version < CURRENT_VERSION {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn get_schema_version(&self) -> Result<i32, DatabaseError> {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(&self, from_version: i32) -> Result<(), DatabaseError> {
        if from_version < 1 {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            self.conn
                .execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                    [CURRENT_VERSION],
                )
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        // Future migrations would go here:
        // if from_version < 2 { ... }

        Ok(())
    }

    // ========== Trip Operations ==========

    /// Insert a closed trip with its segments, fuel events and SOC
    /// transitions in one transaction.
    pub fn insert_trip(
        &mut self,
        trip: &Trip,
        fuel_events: &[FuelEvent],
        soc_transitions: &[SocTransition],
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tx.execute(
            "INSERT INTO trips (id, vehicle_id, started_at, ended_at, closed, last_update,
             distance_m, gas_mpg, electric_miles, electric_kwh, kwh_per_mile,
             soc_floor_pct, soc_floor_at, avg_ambient_temp_c, complete,
             weather_temp_c, weather_conditions, elevation_gain_m, elevation_loss_m,
             enrichment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
             ?16, ?17, ?18, ?19, ?20, datetime('now'))",
            params![
                trip.id.to_string(),
                trip.vehicle_id,
                format_ts(&trip.started_at),
                trip.ended_at.as_ref().map(format_ts),
                trip.closed as i32,
                format_ts(&trip.last_update),
                trip.distance_m,
                trip.gas_mpg,
                trip.electric_miles,
                trip.electric_kwh,
                trip.kwh_per_mile,
                trip.soc_floor_pct,
                trip.soc_floor_at.as_ref().map(format_ts),
                trip.avg_ambient_temp_c,
                trip.complete as i32,
                trip.weather_temp_c,
                trip.weather_conditions,
                trip.elevation_gain_m,
                trip.elevation_loss_m,
                enrichment_to_str(trip.enrichment),
            ],
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO mode_segments (trip_id, mode, started_at, ended_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            for segment in &trip.mode_segments {
                stmt.execute(params![
                    trip.id.to_string(),
                    segment.mode.to_string(),
                    format_ts(&segment.started_at),
                    segment.ended_at.as_ref().map(format_ts),
                ])
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            }
        }

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO fuel_events (trip_id, timestamp, kind, magnitude_pct)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            for event in fuel_events {
                stmt.execute(params![
                    event.trip_id.to_string(),
                    format_ts(&event.timestamp),
                    event.kind.to_string(),
                    event.magnitude_pct,
                ])
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            }
        }

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO soc_transitions (trip_id, timestamp, soc_before_pct,
                     soc_after_pct, kind)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            for transition in soc_transitions {
                stmt.execute(params![
                    transition.trip_id.to_string(),
                    format_ts(&transition.timestamp),
                    transition.soc_before_pct,
                    transition.soc_after_pct,
                    transition.kind.to_string(),
                ])
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            }
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Get a trip by ID, with its mode segments loaded.
    pub fn get_trip(&self, id: &Uuid) -> Result<Option<Trip>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", TRIP_SELECT))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(params![id.to_string()], trip_row);

        match result {
            Ok(row) => {
                let segments = self.get_mode_segments(id)?;
                Ok(Some(row.into_trip(segments)?))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// List trips for a vehicle, most recent first.
    pub fn list_trips(
        &self,
        vehicle_id: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Trip>, DatabaseError> {
        let limit = limit.unwrap_or(100);
        let offset = offset.unwrap_or(0);

        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE vehicle_id = ?1 ORDER BY started_at DESC LIMIT ?2 OFFSET ?3",
                TRIP_SELECT
            ))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![vehicle_id, limit, offset], trip_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut trips = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            let id = Uuid::parse_str(&row.id)
                .map_err(|e| DatabaseError::DeserializationError(format!("Invalid UUID: {}", e)))?;
            let segments = self.get_mode_segments(&id)?;
            trips.push(row.into_trip(segments)?);
        }

        Ok(trips)
    }

    /// Get the mode segments for a trip, in order.
    fn get_mode_segments(&self, trip_id: &Uuid) -> Result<Vec<ModeSegment>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT mode, started_at, ended_at FROM mode_segments
                 WHERE trip_id = ?1 ORDER BY started_at, id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![trip_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut segments = Vec::new();
        for row in rows {
            let (mode, started_at, ended_at) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            segments.push(ModeSegment {
                mode: parse_mode(&mode)?,
                started_at: parse_ts(&started_at)?,
                ended_at: ended_at.as_deref().map(parse_ts).transpose()?,
            });
        }

        Ok(segments)
    }

    /// Get the fuel events recorded for a trip, in order.
    pub fn get_fuel_events(&self, trip_id: &Uuid) -> Result<Vec<FuelEvent>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT timestamp, kind, magnitude_pct FROM fuel_events
                 WHERE trip_id = ?1 ORDER BY timestamp, id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![trip_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            let (timestamp, kind, magnitude_pct) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            events.push(FuelEvent {
                trip_id: *trip_id,
                timestamp: parse_ts(&timestamp)?,
                kind: parse_fuel_event_kind(&kind)?,
                magnitude_pct,
            });
        }

        Ok(events)
    }

    /// Get the SOC transitions recorded for a trip, in order.
    pub fn get_soc_transitions(
        &self,
        trip_id: &Uuid,
    ) -> Result<Vec<SocTransition>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT timestamp, soc_before_pct, soc_after_pct, kind FROM soc_transitions
                 WHERE trip_id = ?1 ORDER BY timestamp, id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![trip_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut transitions = Vec::new();
        for row in rows {
            let (timestamp, soc_before_pct, soc_after_pct, kind) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            transitions.push(SocTransition {
                trip_id: *trip_id,
                timestamp: parse_ts(&timestamp)?,
                soc_before_pct,
                soc_after_pct,
                kind: parse_soc_transition_kind(&kind)?,
            });
        }

        Ok(transitions)
    }

    /// Count trips for a vehicle.
    pub fn count_trips(&self, vehicle_id: &str) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM trips WHERE vehicle_id = ?1",
                params![vehicle_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    /// Apply enrichment to a persisted trip.
    ///
    /// Keyed by trip id and overwriting whole columns, so replaying the
    /// same enrichment is a no-op.
    pub fn apply_trip_enrichment(
        &self,
        trip_id: &Uuid,
        enrichment: &TripEnrichment,
        status: EnrichmentStatus,
    ) -> Result<(), DatabaseError> {
        let rows_affected = self
            .conn
            .execute(
                "UPDATE trips SET weather_temp_c = ?2, weather_conditions = ?3,
                 elevation_gain_m = ?4, elevation_loss_m = ?5, enrichment = ?6,
                 avg_ambient_temp_c = COALESCE(avg_ambient_temp_c, ?7)
                 WHERE id = ?1",
                params![
                    trip_id.to_string(),
                    enrichment.weather_temp_c,
                    enrichment.weather_conditions,
                    enrichment.elevation_gain_m,
                    enrichment.elevation_loss_m,
                    enrichment_to_str(status),
                    enrichment.weather_temp_c,
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if rows_affected == 0 {
            return Err(DatabaseError::NotFound(format!("Trip {}", trip_id)));
        }

        Ok(())
    }

    // ========== Charging Session Operations ==========

    /// Insert a closed charging session.
    pub fn insert_charging_session(
        &self,
        session: &ChargingSession,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO charging_sessions (id, vehicle_id, started_at, ended_at, closed,
                 last_update, start_soc_pct, end_soc_pct, energy_added_kwh, complete, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
                params![
                    session.id.to_string(),
                    session.vehicle_id,
                    format_ts(&session.started_at),
                    session.ended_at.as_ref().map(format_ts),
                    session.closed as i32,
                    format_ts(&session.last_update),
                    session.start_soc_pct,
                    session.end_soc_pct,
                    session.energy_added_kwh,
                    session.complete as i32,
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Get a charging session by ID.
    pub fn get_charging_session(
        &self,
        id: &Uuid,
    ) -> Result<Option<ChargingSession>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", SESSION_SELECT))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(params![id.to_string()], session_row);

        match result {
            Ok(row) => Ok(Some(row.into_session()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// List charging sessions for a vehicle, most recent first.
    pub fn list_charging_sessions(
        &self,
        vehicle_id: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<ChargingSession>, DatabaseError> {
        let limit = limit.unwrap_or(100);
        let offset = offset.unwrap_or(0);

        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE vehicle_id = ?1 ORDER BY started_at DESC LIMIT ?2 OFFSET ?3",
                SESSION_SELECT
            ))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![vehicle_id, limit, offset], session_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut sessions = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            sessions.push(row.into_session()?);
        }

        Ok(sessions)
    }

    /// Count charging sessions for a vehicle.
    pub fn count_charging_sessions(&self, vehicle_id: &str) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM charging_sessions WHERE vehicle_id = ?1",
                params![vehicle_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }
}

const TRIP_SELECT: &str = "SELECT id, vehicle_id, started_at, ended_at, closed, last_update,
     distance_m, gas_mpg, electric_miles, electric_kwh, kwh_per_mile, soc_floor_pct,
     soc_floor_at, avg_ambient_temp_c, complete, weather_temp_c, weather_conditions,
     elevation_gain_m, elevation_loss_m, enrichment FROM trips";

const SESSION_SELECT: &str = "SELECT id, vehicle_id, started_at, ended_at, closed, last_update,
     start_soc_pct, end_soc_pct, energy_added_kwh, complete FROM charging_sessions";

fn trip_row(row: &rusqlite::Row) -> rusqlite::Result<TripRow> {
    Ok(TripRow {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        closed: row.get(4)?,
        last_update: row.get(5)?,
        distance_m: row.get(6)?,
        gas_mpg: row.get(7)?,
        electric_miles: row.get(8)?,
        electric_kwh: row.get(9)?,
        kwh_per_mile: row.get(10)?,
        soc_floor_pct: row.get(11)?,
        soc_floor_at: row.get(12)?,
        avg_ambient_temp_c: row.get(13)?,
        complete: row.get(14)?,
        weather_temp_c: row.get(15)?,
        weather_conditions: row.get(16)?,
        elevation_gain_m: row.get(17)?,
        elevation_loss_m: row.get(18)?,
        enrichment: row.get(19)?,
    })
}

fn session_row(row: &rusqlite::Row) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        closed: row.get(4)?,
        last_update: row.get(5)?,
        start_soc_pct: row.get(6)?,
        end_soc_pct: row.get(7)?,
        energy_added_kwh: row.get(8)?,
        complete: row.get(9)?,
    })
}

fn parse_mode(s: &str) -> Result<PropulsionMode, DatabaseError> {
    match s {
        "electric" => Ok(PropulsionMode::Electric),
        "gas" => Ok(PropulsionMode::Gas),
        _ => Err(DatabaseError::DeserializationError(format!(
            "Unknown propulsion mode: {}",
            s
        ))),
    }
}

fn parse_fuel_event_kind(s: &str) -> Result<FuelEventKind, DatabaseError> {
    match s {
        "gas_mode_entry" => Ok(FuelEventKind::GasModeEntry),
        "gas_mode_exit" => Ok(FuelEventKind::GasModeExit),
        "refuel" => Ok(FuelEventKind::Refuel),
        _ => Err(DatabaseError::DeserializationError(format!(
            "Unknown fuel event kind: {}",
            s
        ))),
    }
}

fn parse_soc_transition_kind(s: &str) -> Result<SocTransitionKind, DatabaseError> {
    match s {
        "floor_reached" => Ok(SocTransitionKind::FloorReached),
        "regen_gain" => Ok(SocTransitionKind::RegenGain),
        "mode_switch" => Ok(SocTransitionKind::ModeSwitch),
        _ => Err(DatabaseError::DeserializationError(format!(
            "Unknown SOC transition kind: {}",
            s
        ))),
    }
}

fn enrichment_to_str(status: EnrichmentStatus) -> &'static str {
    match status {
        EnrichmentStatus::Pending => "pending",
        EnrichmentStatus::Applied => "applied",
        EnrichmentStatus::Unavailable => "unavailable",
    }
}

fn parse_enrichment(s: &str) -> Result<EnrichmentStatus, DatabaseError> {
    match s {
        "pending" => Ok(EnrichmentStatus::Pending),
        "applied" => Ok(EnrichmentStatus::Applied),
        "unavailable" => Ok(EnrichmentStatus::Unavailable),
        _ => Err(DatabaseError::DeserializationError(format!(
            "Unknown enrichment status: {}",
            s
        ))),
    }
}

/// Intermediate struct for reading trip rows from database.
struct TripRow {
    id: String,
    vehicle_id: String,
    started_at: String,
    ended_at: Option<String>,
    closed: i32,
    last_update: String,
    distance_m: f64,
    gas_mpg: Option<f64>,
    electric_miles: f64,
    electric_kwh: f64,
    kwh_per_mile: Option<f64>,
    soc_floor_pct: Option<f64>,
    soc_floor_at: Option<String>,
    avg_ambient_temp_c: Option<f64>,
    complete: i32,
    weather_temp_c: Option<f64>,
    weather_conditions: Option<String>,
    elevation_gain_m: Option<f64>,
    elevation_loss_m: Option<f64>,
    enrichment: String,
}

impl TripRow {
    fn into_trip(self, mode_segments: Vec<ModeSegment>) -> Result<Trip, DatabaseError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| DatabaseError::DeserializationError(format!("Invalid UUID: {}", e)))?;

        Ok(Trip {
            id,
            vehicle_id: self.vehicle_id,
            started_at: parse_ts(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_ts).transpose()?,
            closed: self.closed != 0,
            last_update: parse_ts(&self.last_update)?,
            mode_segments,
            distance_m: self.distance_m,
            gas_mpg: self.gas_mpg,
            electric_miles: self.electric_miles,
            electric_kwh: self.electric_kwh,
            kwh_per_mile: self.kwh_per_mile,
            soc_floor_pct: self.soc_floor_pct,
            soc_floor_at: self.soc_floor_at.as_deref().map(parse_ts).transpose()?,
            avg_ambient_temp_c: self.avg_ambient_temp_c,
            complete: self.complete != 0,
            weather_temp_c: self.weather_temp_c,
            weather_conditions: self.weather_conditions,
            elevation_gain_m: self.elevation_gain_m,
            elevation_loss_m: self.elevation_loss_m,
            enrichment: parse_enrichment(&self.enrichment)?,
        })
    }
}

/// Intermediate struct for reading charging session rows from database.
struct SessionRow {
    id: String,
    vehicle_id: String,
    started_at: String,
    ended_at: Option<String>,
    closed: i32,
    last_update: String,
    start_soc_pct: f64,
    end_soc_pct: Option<f64>,
    energy_added_kwh: Option<f64>,
    complete: i32,
}

impl SessionRow {
    fn into_session(self) -> Result<ChargingSession, DatabaseError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| DatabaseError::DeserializationError(format!("Invalid UUID: {}", e)))?;

        Ok(ChargingSession {
            id,
            vehicle_id: self.vehicle_id,
            started_at: parse_ts(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_ts).transpose()?,
            closed: self.closed != 0,
            last_update: parse_ts(&self.last_update)?,
            start_soc_pct: self.start_soc_pct,
            end_soc_pct: self.end_soc_pct,
            energy_added_kwh: self.energy_added_kwh,
            complete: self.complete != 0,
        })
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(s as i64)
    }

    fn closed_trip() -> Trip {
        let mut trip = Trip::open("veh-1", ts(0));
        trip.switch_mode(PropulsionMode::Gas, ts(300));
        trip.seal_segments(ts(600));
        trip.ended_at = Some(ts(600));
        trip.closed = true;
        trip.complete = true;
        trip.last_update = ts(600);
        trip.distance_m = 4500.0;
        trip.soc_floor_pct = Some(61.5);
        trip.soc_floor_at = Some(ts(540));
        trip
    }

    #[test]
    fn test_create_in_memory_database() {
        let db = Database::open_in_memory().expect("Failed to create database");
        let version = db.get_schema_version().expect("Failed to get version");
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_reopen_on_disk_database_keeps_data() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("voltrace.db");

        let trip = closed_trip();
        let trip_id = trip.id;
        {
            let mut db = Database::open(&path).expect("Failed to create database");
            db.insert_trip(&trip, &[], &[]).expect("Failed to insert trip");
        }

        let db = Database::open(&path).expect("Failed to reopen database");
        assert_eq!(db.get_schema_version().unwrap(), CURRENT_VERSION);
        let retrieved = db
            .get_trip(&trip_id)
            .expect("Failed to get trip")
            .expect("Trip not found");
        assert_eq!(retrieved.vehicle_id, "veh-1");
        assert_eq!(retrieved.distance_m, 4500.0);
    }

    #[test]
    fn test_tables_created() {
        let db = Database::open_in_memory().expect("Failed to create database");

        let tables: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"trips".to_string()));
        assert!(tables.contains(&"mode_segments".to_string()));
        assert!(tables.contains(&"fuel_events".to_string()));
        assert!(tables.contains(&"soc_transitions".to_string()));
        assert!(tables.contains(&"charging_sessions".to_string()));
    }

    #[test]
    fn test_trip_insert_and_get() {
        let mut db = Database::open_in_memory().expect("Failed to create database");
        let trip = closed_trip();
        let trip_id = trip.id;

        let fuel_events = vec![FuelEvent {
            trip_id,
            timestamp: ts(300),
            kind: FuelEventKind::GasModeEntry,
            magnitude_pct: -0.4,
        }];
        let soc_transitions = vec![SocTransition {
            trip_id,
            timestamp: ts(540),
            soc_before_pct: 63.0,
            soc_after_pct: 61.5,
            kind: SocTransitionKind::FloorReached,
        }];

        db.insert_trip(&trip, &fuel_events, &soc_transitions)
            .expect("Failed to insert trip");

        let retrieved = db
            .get_trip(&trip_id)
            .expect("Failed to get trip")
            .expect("Trip not found");

        assert_eq!(retrieved.vehicle_id, "veh-1");
        assert_eq!(retrieved.started_at, ts(0));
        assert_eq!(retrieved.ended_at, Some(ts(600)));
        assert!(retrieved.closed);
        assert!(retrieved.complete);
        assert_eq!(retrieved.mode_segments.len(), 2);
        assert_eq!(retrieved.mode_segments[0].mode, PropulsionMode::Electric);
        assert_eq!(retrieved.mode_segments[1].mode, PropulsionMode::Gas);
        assert_eq!(retrieved.soc_floor_pct, Some(61.5));
        assert_eq!(retrieved.soc_floor_at, Some(ts(540)));
        assert_eq!(retrieved.enrichment, EnrichmentStatus::Pending);

        let events = db.get_fuel_events(&trip_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FuelEventKind::GasModeEntry);

        let transitions = db.get_soc_transitions(&trip_id).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, SocTransitionKind::FloorReached);
    }

    #[test]
    fn test_list_trips_filters_by_vehicle() {
        let mut db = Database::open_in_memory().expect("Failed to create database");

        let trip_a = closed_trip();
        let mut trip_b = closed_trip();
        trip_b.id = Uuid::new_v4();
        trip_b.vehicle_id = "veh-2".to_string();

        db.insert_trip(&trip_a, &[], &[]).unwrap();
        db.insert_trip(&trip_b, &[], &[]).unwrap();

        let trips = db.list_trips("veh-1", None, None).unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].id, trip_a.id);
        assert_eq!(db.count_trips("veh-2").unwrap(), 1);
    }

    #[test]
    fn test_charging_session_roundtrip() {
        let db = Database::open_in_memory().expect("Failed to create database");

        let mut session = ChargingSession::open("veh-1", ts(0), 40.0);
        session.ended_at = Some(ts(600));
        session.closed = true;
        session.complete = true;
        session.last_update = ts(600);
        session.end_soc_pct = Some(48.0);
        session.energy_added_kwh = Some(1.28);

        db.insert_charging_session(&session).unwrap();

        let retrieved = db
            .get_charging_session(&session.id)
            .unwrap()
            .expect("Session not found");

        assert_eq!(retrieved.start_soc_pct, 40.0);
        assert_eq!(retrieved.end_soc_pct, Some(48.0));
        assert!(retrieved.complete);
        assert_eq!(db.count_charging_sessions("veh-1").unwrap(), 1);
    }

    #[test]
    fn test_enrichment_update_is_idempotent() {
        let mut db = Database::open_in_memory().expect("Failed to create database");
        let trip = closed_trip();
        db.insert_trip(&trip, &[], &[]).unwrap();

        let enrichment = TripEnrichment {
            weather_temp_c: Some(18.5),
            weather_conditions: Some("Partly cloudy".to_string()),
            elevation_gain_m: Some(120.0),
            elevation_loss_m: Some(95.0),
        };

        db.apply_trip_enrichment(&trip.id, &enrichment, EnrichmentStatus::Applied)
            .unwrap();
        // Applying the same enrichment twice leaves the row unchanged
        db.apply_trip_enrichment(&trip.id, &enrichment, EnrichmentStatus::Applied)
            .unwrap();

        let retrieved = db.get_trip(&trip.id).unwrap().unwrap();
        assert_eq!(retrieved.weather_temp_c, Some(18.5));
        assert_eq!(retrieved.elevation_gain_m, Some(120.0));
        assert_eq!(retrieved.enrichment, EnrichmentStatus::Applied);

        let missing = Uuid::new_v4();
        assert!(matches!(
            db.apply_trip_enrichment(&missing, &enrichment, EnrichmentStatus::Applied),
            Err(DatabaseError::NotFound(_))
        ));
    }
}
