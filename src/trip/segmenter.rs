//! Per-vehicle trip lifecycle state machine.

use crate::config::EngineConfig;
use crate::detect::charging::{ChargingDetector, ChargingUpdate};
use crate::detect::{FuelModeDetector, SocAnalyzer};
use crate::telemetry::Reading;
use crate::trip::finalizer;
use crate::trip::types::{ChargingSession, FuelEvent, SocTransition, Trip};
use chrono::NaiveDateTime;

/// A trip closed together with its append-only event records and the GPS
/// track collected for enrichment.
#[derive(Debug)]
pub struct ClosedTrip {
    /// The closed, finalized trip
    pub trip: Trip,
    /// Fuel events recorded during the trip, in order
    pub fuel_events: Vec<FuelEvent>,
    /// SOC transitions recorded during the trip, in order
    pub soc_transitions: Vec<SocTransition>,
    /// Ordered GPS track for elevation enrichment
    pub track: Vec<(f64, f64)>,
}

/// An entity closed by applying a reading or by the sweep.
#[derive(Debug)]
pub enum ClosedEntity {
    /// A trip reached a boundary
    Trip(Box<ClosedTrip>),
    /// A charging session reached a boundary
    Session(ChargingSession),
}

/// Live state of the currently open trip.
struct OpenTrip {
    trip: Trip,
    fuel: FuelModeDetector,
    soc: SocAnalyzer,
    fuel_events: Vec<FuelEvent>,
    soc_transitions: Vec<SocTransition>,
    ambient_sum_c: f64,
    ambient_count: u32,
    track: Vec<(f64, f64)>,
}

/// Owns the trip/charging lifecycle for one vehicle.
///
/// At most one trip and at most one charging session are open at any
/// instant, and never both: a reading that would qualify for both resolves
/// in favor of whichever is already open.
pub struct TripSegmenter {
    config: EngineConfig,
    vehicle_id: String,
    open: Option<OpenTrip>,
    charging: ChargingDetector,
    /// Last causal reading applied (any entity)
    last_reading: Option<Reading>,
    /// Start of the current stationary spell within an open trip
    stationary_since: Option<NaiveDateTime>,
}

impl TripSegmenter {
    /// Create the segmenter for one vehicle.
    pub fn new(vehicle_id: &str, config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            vehicle_id: vehicle_id.to_string(),
            open: None,
            charging: ChargingDetector::new(config),
            last_reading: None,
            stationary_since: None,
        }
    }

    /// Whether a trip is currently open.
    pub fn has_open_trip(&self) -> bool {
        self.open.is_some()
    }

    /// Whether a charging session is currently open.
    pub fn has_open_session(&self) -> bool {
        self.charging.is_charging()
    }

    /// Last-update timestamp of the open trip, if any.
    pub fn trip_last_update(&self) -> Option<NaiveDateTime> {
        self.open.as_ref().map(|o| o.trip.last_update)
    }

    /// Apply one normalized reading; returns any entities it closed.
    pub fn apply(&mut self, reading: &Reading) -> Vec<ClosedEntity> {
        // Flagged readings update order-independent extrema only: no
        // opens, no closes, no recorded transitions. The fuel smoothing
        // baseline stays causal; a stale level must not seed the next
        // delta.
        if reading.out_of_order {
            if let Some(open) = self.open.as_mut() {
                open.soc.observe_extrema(reading, &open.trip);
            }
            self.charging.observe_extrema(reading);
            return Vec::new();
        }

        let mut closed = Vec::new();

        if let Some(open) = self.open.as_ref() {
            let gap = (reading.timestamp - open.trip.last_update).num_seconds();
            if gap > self.config.trip_timeout_secs as i64 {
                // The gap is only observable now that a reading arrived;
                // the trip ended back at its last update.
                let end = open.trip.last_update;
                if let Some(trip) = self.close_trip(end, true) {
                    closed.push(ClosedEntity::Trip(Box::new(trip)));
                }
                // Fall through: this reading may start something new.
            } else {
                self.extend_trip(reading, &mut closed);
                self.last_reading = Some(reading.clone());
                return closed;
            }
        }

        // No trip open at this point.
        if self.charging.is_charging() {
            // Driving cannot begin while charging is open; motion will
            // first close the session and the next qualifying reading may
            // open a trip.
            if let ChargingUpdate::Closed(session) = self.charging.process(reading) {
                closed.push(ClosedEntity::Session(session));
            }
        } else if self.qualifies_motion(reading) {
            let mut open = OpenTrip {
                trip: Trip::open(&self.vehicle_id, reading.timestamp),
                fuel: FuelModeDetector::new(&self.config),
                soc: SocAnalyzer::new(&self.config),
                fuel_events: Vec::new(),
                soc_transitions: Vec::new(),
                ambient_sum_c: 0.0,
                ambient_count: 0,
                track: Vec::new(),
            };
            tracing::info!(
                "Trip {} opened for {} at {}",
                open.trip.id,
                self.vehicle_id,
                reading.timestamp
            );
            self.open = Some(open);
            self.stationary_since = None;
            // The opening reading also feeds the detectors; no distance
            // accrues before the trip exists.
            self.last_reading = Some(reading.clone());
            self.extend_trip(reading, &mut closed);
        } else if let ChargingUpdate::Closed(session) = self.charging.process(reading) {
            closed.push(ClosedEntity::Session(session));
        }

        self.last_reading = Some(reading.clone());
        closed
    }

    /// Reconcile stale state against the given instant.
    ///
    /// Idempotent: entities already closed are untouched, and a second
    /// sweep over the same state finds nothing to do.
    pub fn sweep(&mut self, now: NaiveDateTime) -> Vec<ClosedEntity> {
        let mut closed = Vec::new();

        let trip_stale = self
            .open
            .as_ref()
            .map(|o| (now - o.trip.last_update).num_seconds() > self.config.trip_timeout_secs as i64)
            .unwrap_or(false);
        if trip_stale {
            let end = self.open.as_ref().map(|o| o.trip.last_update).unwrap_or(now);
            tracing::info!("Sweeper force-closing stale trip for {}", self.vehicle_id);
            if let Some(trip) = self.close_trip(end, false) {
                closed.push(ClosedEntity::Trip(Box::new(trip)));
            }
        }

        let session_stale = self
            .charging
            .last_update()
            .map(|last| (now - last).num_seconds() > self.config.charging_timeout_secs as i64)
            .unwrap_or(false);
        if session_stale {
            let end = self.charging.last_update().unwrap_or(now);
            tracing::info!("Sweeper force-closing stale charging session for {}", self.vehicle_id);
            if let Some(session) = self.charging.close(end, false) {
                closed.push(ClosedEntity::Session(session));
            }
        }

        closed
    }

    /// Whether a reading indicates motion that can open a trip.
    fn qualifies_motion(&self, reading: &Reading) -> bool {
        if reading.speed_kmh.map(|s| s > self.config.stationary_epsilon_kmh) == Some(true) {
            return true;
        }
        match (
            reading.odometer_m,
            self.last_reading.as_ref().and_then(|r| r.odometer_m),
        ) {
            (Some(now), Some(prev)) => now > prev,
            _ => false,
        }
    }

    /// Distance covered since the last reading, meters.
    ///
    /// Odometer deltas are authoritative when both endpoints carry one;
    /// otherwise speed is integrated over the gap.
    fn distance_delta_m(&self, reading: &Reading) -> f64 {
        let prev = match self.last_reading.as_ref() {
            Some(prev) => prev,
            None => return 0.0,
        };
        if let (Some(now), Some(before)) = (reading.odometer_m, prev.odometer_m) {
            return (now - before).max(0.0);
        }
        let dt_secs = (reading.timestamp - prev.timestamp).num_seconds().max(0) as f64;
        reading.speed_kmh.unwrap_or(0.0) / 3.6 * dt_secs
    }

    /// Feed one causal reading into the open trip.
    fn extend_trip(&mut self, reading: &Reading, closed: &mut Vec<ClosedEntity>) {
        let distance = self.distance_delta_m(reading);
        let config_dwell = self.config.stationary_dwell_secs as i64;
        let epsilon = self.config.stationary_epsilon_kmh;

        let Some(open) = self.open.as_mut() else {
            return;
        };

        open.trip.distance_m += distance;

        let (events, switch) = open.fuel.process(reading, distance, &mut open.trip);
        open.fuel_events.extend(events);
        if switch.is_some() {
            if let Some(transition) = open.soc.mode_switch_transition(&open.trip, reading.timestamp)
            {
                open.soc_transitions.push(transition);
            }
        }

        open.soc_transitions
            .extend(open.soc.process(reading, distance, &open.trip));

        if let Some(temp) = reading.ambient_temp_c {
            open.ambient_sum_c += temp;
            open.ambient_count += 1;
        }
        if let (Some(lat), Some(lon)) = (reading.latitude, reading.longitude) {
            open.track.push((lat, lon));
        }

        open.trip.last_update = reading.timestamp;

        // Stationary-and-quiet dwell closes the trip normally.
        if reading.is_stationary(epsilon) {
            let since = *self.stationary_since.get_or_insert(reading.timestamp);
            if (reading.timestamp - since).num_seconds() >= config_dwell {
                if let Some(trip) = self.close_trip(reading.timestamp, true) {
                    closed.push(ClosedEntity::Trip(Box::new(trip)));
                }
            }
        } else {
            self.stationary_since = None;
        }
    }

    /// Close and finalize the open trip. No-op when none is open.
    fn close_trip(&mut self, end: NaiveDateTime, complete: bool) -> Option<ClosedTrip> {
        let mut open = self.open.take()?;
        self.stationary_since = None;

        finalizer::finalize_trip(
            &mut open.trip,
            &open.fuel,
            &open.soc,
            open.ambient_sum_c,
            open.ambient_count,
            end,
            complete,
        );

        tracing::info!(
            "Trip {} closed for {} at {} (complete: {}, {:.1} m)",
            open.trip.id,
            self.vehicle_id,
            end,
            complete,
            open.trip.distance_m
        );

        Some(ClosedTrip {
            trip: open.trip,
            fuel_events: open.fuel_events,
            soc_transitions: open.soc_transitions,
            track: open.track,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(s as i64)
    }

    fn reading(s: u32, speed: f64, fuel: f64, soc: f64) -> Reading {
        Reading {
            vehicle_id: "veh-1".to_string(),
            timestamp: ts(s),
            latitude: None,
            longitude: None,
            speed_kmh: Some(speed),
            fuel_level_pct: Some(fuel),
            soc_pct: Some(soc),
            pack_voltage: None,
            cell_voltages: None,
            ambient_temp_c: None,
            odometer_m: None,
            out_of_order: false,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            trip_timeout_secs: 600,
            stationary_dwell_secs: 300,
            ..Default::default()
        }
    }

    #[test]
    fn test_motion_opens_trip_and_stillness_does_not() {
        let config = config();
        let mut segmenter = TripSegmenter::new("veh-1", &config);

        segmenter.apply(&reading(0, 0.0, 50.0, 80.0));
        assert!(!segmenter.has_open_trip());

        segmenter.apply(&reading(60, 30.0, 50.0, 79.0));
        assert!(segmenter.has_open_trip());
    }

    #[test]
    fn test_gap_close_is_normal_and_reading_reopens() {
        let config = config();
        let mut segmenter = TripSegmenter::new("veh-1", &config);

        segmenter.apply(&reading(0, 30.0, 50.0, 80.0));
        segmenter.apply(&reading(60, 30.0, 50.0, 79.0));

        // Next reading arrives far beyond the trip timeout
        let closed = segmenter.apply(&reading(60 + 700, 25.0, 50.0, 70.0));
        assert_eq!(closed.len(), 1);
        let ClosedEntity::Trip(trip) = &closed[0] else {
            panic!("expected closed trip");
        };
        assert!(trip.trip.complete);
        assert_eq!(trip.trip.ended_at, Some(ts(60)));

        // The same reading opened a fresh trip
        assert!(segmenter.has_open_trip());
    }

    #[test]
    fn test_stationary_dwell_closes_trip() {
        let config = EngineConfig {
            stationary_dwell_secs: 120,
            ..config()
        };
        let mut segmenter = TripSegmenter::new("veh-1", &config);

        segmenter.apply(&reading(0, 30.0, 50.0, 80.0));
        segmenter.apply(&reading(60, 0.0, 50.0, 79.0));
        segmenter.apply(&reading(120, 0.0, 50.0, 79.0));
        let closed = segmenter.apply(&reading(180, 0.0, 50.0, 79.0));

        assert_eq!(closed.len(), 1);
        let ClosedEntity::Trip(trip) = &closed[0] else {
            panic!("expected closed trip");
        };
        assert!(trip.trip.complete);
        assert_eq!(trip.trip.ended_at, Some(ts(180)));
        assert!(!segmenter.has_open_trip());
    }

    #[test]
    fn test_sweep_force_close_marks_incomplete() {
        let config = config();
        let mut segmenter = TripSegmenter::new("veh-1", &config);

        segmenter.apply(&reading(0, 30.0, 50.0, 80.0));
        segmenter.apply(&reading(120, 0.0, 50.0, 76.0));

        let closed = segmenter.sweep(ts(120 + 601));
        assert_eq!(closed.len(), 1);
        let ClosedEntity::Trip(trip) = &closed[0] else {
            panic!("expected closed trip");
        };
        assert!(!trip.trip.complete);
        assert_eq!(trip.trip.ended_at, Some(ts(120)));

        // Idempotent: nothing left to sweep
        assert!(segmenter.sweep(ts(120 + 1200)).is_empty());
    }

    #[test]
    fn test_out_of_order_fuel_reading_leaves_causal_baseline_alone() {
        let config = EngineConfig {
            fuel_smoothing_window: 1,
            ..config()
        };
        let mut segmenter = TripSegmenter::new("veh-1", &config);

        segmenter.apply(&reading(0, 30.0, 50.0, 80.0));
        segmenter.apply(&reading(60, 0.0, 50.0, 80.0));

        // A stale, lower fuel level arrives late and flagged
        let mut late = reading(30, 0.0, 47.0, 80.0);
        late.out_of_order = true;
        assert!(segmenter.apply(&late).is_empty());

        // The causal level never moved, so this is not a refuel
        segmenter.apply(&reading(120, 0.0, 50.0, 80.0));

        let closed = segmenter.sweep(ts(120 + 601));
        assert_eq!(closed.len(), 1);
        let ClosedEntity::Trip(trip) = &closed[0] else {
            panic!("expected closed trip");
        };
        assert!(trip.fuel_events.is_empty());
    }

    #[test]
    fn test_no_trip_opens_while_session_open() {
        let config = config();
        let mut segmenter = TripSegmenter::new("veh-1", &config);

        // Open a charging session with a sustained stationary rise
        segmenter.apply(&reading(0, 0.0, 50.0, 40.0));
        segmenter.apply(&reading(60, 0.0, 50.0, 42.0));
        segmenter.apply(&reading(120, 0.0, 50.0, 45.0));
        segmenter.apply(&reading(180, 0.0, 50.0, 48.0));
        assert!(segmenter.has_open_session());

        // Motion closes the session but does not open a trip yet
        let closed = segmenter.apply(&reading(240, 30.0, 50.0, 48.0));
        assert_eq!(closed.len(), 1);
        assert!(matches!(closed[0], ClosedEntity::Session(_)));
        assert!(!segmenter.has_open_trip());

        // The next qualifying reading opens the trip
        segmenter.apply(&reading(300, 30.0, 50.0, 48.0));
        assert!(segmenter.has_open_trip());
        assert!(!segmenter.has_open_session());
    }
}
