//! Multi-vehicle telemetry engine: ingest, persist, enrich.
//!
//! One segmenter lives behind a lock per vehicle, so vehicles never
//! contend with each other. A closed entity is persisted while the
//! vehicle lock is held; enrichment runs strictly after the lock is
//! released and lands as an idempotent update.

use crate::config::EngineConfig;
use crate::enrichment::Enricher;
use crate::storage::{Database, DatabaseError};
use crate::telemetry::{RawReading, ReadingNormalizer, ValidationError};
use crate::trip::segmenter::{ClosedEntity, TripSegmenter};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Engine errors.
///
/// Validation failures reject a single reading; storage failures are the
/// only fatal class.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid reading: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),
}

/// What a sweep pass found.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    /// Vehicles inspected
    pub swept: usize,
    /// Vehicles skipped because their lock was contended
    pub skipped: usize,
    /// Trips force-closed
    pub trips_closed: usize,
    /// Charging sessions force-closed
    pub sessions_closed: usize,
}

/// Per-vehicle mutable state.
struct VehicleState {
    segmenter: TripSegmenter,
}

/// The multi-vehicle detection engine.
pub struct TelemetryEngine {
    config: EngineConfig,
    normalizer: Mutex<ReadingNormalizer>,
    vehicles: std::sync::Mutex<HashMap<String, Arc<Mutex<VehicleState>>>>,
    /// Latest causal timestamp normalized across all vehicles
    stream_time: std::sync::Mutex<Option<NaiveDateTime>>,
    db: Arc<Mutex<Database>>,
    enricher: Enricher,
}

impl TelemetryEngine {
    /// Create an engine over an opened database.
    pub fn new(config: EngineConfig, db: Database) -> Self {
        let enricher = Enricher::new(&config.enrichment);
        Self {
            config,
            normalizer: Mutex::new(ReadingNormalizer::new()),
            vehicles: std::sync::Mutex::new(HashMap::new()),
            stream_time: std::sync::Mutex::new(None),
            db: Arc::new(Mutex::new(db)),
            enricher,
        }
    }

    /// High-water mark of the timestamps ingested so far.
    ///
    /// This is the stream's own clock: sweeps over replayed history must
    /// be measured against it, not against the wall clock.
    pub fn stream_time(&self) -> Option<NaiveDateTime> {
        match self.stream_time.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Shared handle to the underlying database.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Number of vehicles with engine state.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// Ingest one raw reading.
    ///
    /// An invalid reading is rejected with `EngineError::Validation` and
    /// leaves all state untouched. `EngineError::Storage` means a closed
    /// entity could not be persisted and the stream should stop.
    pub async fn ingest(&self, raw: &RawReading) -> Result<(), EngineError> {
        let reading = self.normalizer.lock().await.normalize(raw)?;

        {
            let mut stream = match self.stream_time.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *stream = Some(stream.map_or(reading.timestamp, |t| t.max(reading.timestamp)));
        }

        let vehicle = self.vehicle_state(&reading.vehicle_id);

        // Persist while the vehicle lock is held so a second reading for
        // the same vehicle cannot interleave between close and write.
        let closed = {
            let mut state = vehicle.lock().await;
            let closed = state.segmenter.apply(&reading);
            self.persist(&closed).await?;
            closed
        };

        self.enrich(closed).await?;

        Ok(())
    }

    /// Reconcile stale entities across all vehicles against `now`.
    ///
    /// Skips any vehicle whose lock is contended; the next pass will
    /// catch it. Idempotent over already-closed state.
    pub async fn sweep_once(&self, now: NaiveDateTime) -> Result<SweepReport, EngineError> {
        let snapshot: Vec<(String, Arc<Mutex<VehicleState>>)> = self
            .vehicles
            .lock()
            .map(|v| v.iter().map(|(k, s)| (k.clone(), Arc::clone(s))).collect())
            .unwrap_or_default();

        let mut report = SweepReport::default();
        let mut pending = Vec::new();

        for (vehicle_id, vehicle) in snapshot {
            let Ok(mut state) = vehicle.try_lock() else {
                tracing::debug!("Sweep skipping {}: ingest in progress", vehicle_id);
                report.skipped += 1;
                continue;
            };

            report.swept += 1;
            let closed = state.segmenter.sweep(now);
            if closed.is_empty() {
                continue;
            }

            for entity in &closed {
                match entity {
                    ClosedEntity::Trip(_) => report.trips_closed += 1,
                    ClosedEntity::Session(_) => report.sessions_closed += 1,
                }
            }

            self.persist(&closed).await?;
            drop(state);
            pending.extend(closed);
        }

        self.enrich(pending).await?;

        Ok(report)
    }

    /// Get or create the state handle for one vehicle.
    fn vehicle_state(&self, vehicle_id: &str) -> Arc<Mutex<VehicleState>> {
        let mut vehicles = match self.vehicles.lock() {
            Ok(vehicles) => vehicles,
            Err(poisoned) => poisoned.into_inner(),
        };
        vehicles
            .entry(vehicle_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating engine state for vehicle {}", vehicle_id);
                Arc::new(Mutex::new(VehicleState {
                    segmenter: TripSegmenter::new(vehicle_id, &self.config),
                }))
            })
            .clone()
    }

    /// Write closed entities to the store. Any failure here is fatal.
    async fn persist(&self, closed: &[ClosedEntity]) -> Result<(), EngineError> {
        if closed.is_empty() {
            return Ok(());
        }

        let mut db = self.db.lock().await;
        for entity in closed {
            match entity {
                ClosedEntity::Trip(trip) => {
                    db.insert_trip(&trip.trip, &trip.fuel_events, &trip.soc_transitions)?;
                }
                ClosedEntity::Session(session) => {
                    db.insert_charging_session(session)?;
                }
            }
        }

        Ok(())
    }

    /// Enrich closed trips after their vehicle lock is released.
    ///
    /// Collaborator failures only downgrade the enrichment status; a
    /// storage failure applying the update is still fatal.
    async fn enrich(&self, closed: Vec<ClosedEntity>) -> Result<(), EngineError> {
        for entity in closed {
            let ClosedEntity::Trip(trip) = entity else {
                continue;
            };

            let (enrichment, status) = self.enricher.enrich_trip(&trip.trip, &trip.track).await;
            self.db
                .lock()
                .await
                .apply_trip_enrichment(&trip.trip.id, &enrichment, status)?;
        }

        Ok(())
    }
}
