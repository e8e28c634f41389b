//! Propulsion-mode classification and fuel event detection.

use crate::config::EngineConfig;
use crate::detect::smoothing::DampedLevel;
use crate::telemetry::Reading;
use crate::trip::types::{FuelEvent, FuelEventKind, PropulsionMode, Trip};

const METERS_PER_MILE: f64 = 1609.344;

/// Classifies propulsion mode per reading and detects fuel events.
///
/// One detector instance lives for the duration of one trip. The smoothed
/// fuel level suppresses sensor jitter; a mode switch is only committed
/// after the candidate mode persists for the configured dwell count.
#[derive(Debug)]
pub struct FuelModeDetector {
    config: EngineConfig,
    /// Smoothed fuel level
    level: DampedLevel,
    /// Candidate mode not yet committed
    candidate: Option<PropulsionMode>,
    /// Consecutive readings the candidate has persisted
    candidate_run: u32,
    /// Distance covered while committed to gas mode, meters
    gas_distance_m: f64,
    /// Smoothed fuel consumed while in gas mode, percent of tank
    gas_fuel_used_pct: f64,
}

impl FuelModeDetector {
    /// Create a detector for a newly opened trip.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            level: DampedLevel::new(config.fuel_smoothing_window),
            candidate: None,
            candidate_run: 0,
            gas_distance_m: 0.0,
            gas_fuel_used_pct: 0.0,
        }
    }

    /// Process one causal reading against the open trip.
    ///
    /// `distance_delta_m` is the distance covered since the previous
    /// reading. Returns fuel events to record; mode segments on the trip
    /// are updated in place. Returns the committed mode switch, if any,
    /// so the caller can record the matching SOC transition.
    pub fn process(
        &mut self,
        reading: &Reading,
        distance_delta_m: f64,
        trip: &mut Trip,
    ) -> (Vec<FuelEvent>, Option<PropulsionMode>) {
        let mut events = Vec::new();

        // Gas-mode distance accrues on every reading spent in gas mode,
        // not only those carrying a fuel level.
        if trip.current_mode() == PropulsionMode::Gas {
            self.gas_distance_m += distance_delta_m;
        }

        let Some(fuel) = reading.fuel_level_pct else {
            return (events, None);
        };

        let raw_delta = self.level.last_raw().map(|prev| fuel - prev).unwrap_or(0.0);
        let step = self.level.update(fuel);

        // Smoothed rise above the noise threshold is either a refuel
        // (stationary) or a sensor step change (moving). Either way the
        // old smoothing baseline is meaningless afterwards.
        if step > self.config.fuel_noise_threshold_pct {
            if reading.is_stationary(self.config.stationary_epsilon_kmh) {
                tracing::info!(
                    "Refuel detected for {}: +{:.1}% at {}",
                    reading.vehicle_id,
                    raw_delta,
                    reading.timestamp
                );
                events.push(FuelEvent {
                    trip_id: trip.id,
                    timestamp: reading.timestamp,
                    kind: FuelEventKind::Refuel,
                    magnitude_pct: raw_delta,
                });
            } else {
                tracing::debug!(
                    "Fuel-level step of {:.1}% while moving treated as baseline shift",
                    raw_delta
                );
            }
            self.level.rebase(fuel);
            // A rise is not consumption; no mode evidence either way.
            return (events, None);
        }

        // Consumption proxy: a smoothed decline steeper than the burn
        // threshold means the engine is running.
        let observed = if step < -self.config.gas_burn_threshold_pct {
            PropulsionMode::Gas
        } else {
            PropulsionMode::Electric
        };

        // Gas accounting uses the smoothed decline, ignoring rises.
        if trip.current_mode() == PropulsionMode::Gas && step < 0.0 {
            self.gas_fuel_used_pct += -step;
        }

        let committed = trip.current_mode();
        let switch = if observed == committed {
            self.candidate = None;
            self.candidate_run = 0;
            None
        } else {
            // Hysteresis: the opposite mode must persist for the dwell
            // count before the switch is committed.
            if self.candidate == Some(observed) {
                self.candidate_run += 1;
            } else {
                self.candidate = Some(observed);
                self.candidate_run = 1;
            }

            if self.candidate_run >= self.config.mode_dwell_count {
                self.candidate = None;
                self.candidate_run = 0;
                trip.switch_mode(observed, reading.timestamp);
                let kind = match observed {
                    PropulsionMode::Gas => FuelEventKind::GasModeEntry,
                    PropulsionMode::Electric => FuelEventKind::GasModeExit,
                };
                tracing::info!(
                    "Mode switch to {} for {} at {}",
                    observed,
                    reading.vehicle_id,
                    reading.timestamp
                );
                events.push(FuelEvent {
                    trip_id: trip.id,
                    timestamp: reading.timestamp,
                    kind,
                    magnitude_pct: step,
                });
                Some(observed)
            } else {
                None
            }
        };

        (events, switch)
    }

    /// Gas mileage over gas-mode segments, if any gas was burned.
    ///
    /// Distance in the gas segments divided by fuel consumed there;
    /// refuel-induced rises never enter the consumption sum.
    pub fn gas_mpg(&self) -> Option<f64> {
        let gallons = self.gas_fuel_used_pct / 100.0 * self.config.tank_capacity_gal;
        if gallons <= 0.0 || self.gas_distance_m <= 0.0 {
            return None;
        }
        Some(self.gas_distance_m / METERS_PER_MILE / gallons)
    }
}
