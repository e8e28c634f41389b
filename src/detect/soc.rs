//! Battery state-of-charge analysis within a trip.

use crate::config::EngineConfig;
use crate::telemetry::Reading;
use crate::trip::types::{PropulsionMode, SocTransition, SocTransitionKind, Trip};
use chrono::NaiveDateTime;

const METERS_PER_MILE: f64 = 1609.344;

/// Tracks SOC extrema and electric-mode energy use for one open trip.
///
/// The floor is monotone non-increasing within the trip and resets only
/// when a new trip opens (a new analyzer is constructed per trip).
#[derive(Debug)]
pub struct SocAnalyzer {
    config: EngineConfig,
    /// Running minimum SOC
    floor_pct: Option<f64>,
    /// When the floor was observed
    floor_at: Option<NaiveDateTime>,
    /// Floor value at the last emitted floor_reached transition
    emitted_floor_pct: Option<f64>,
    /// Last causal SOC value
    last_soc_pct: Option<f64>,
    /// Distance covered in electric mode, meters
    electric_distance_m: f64,
    /// Energy consumed in electric mode, kWh
    electric_kwh: f64,
}

impl SocAnalyzer {
    /// Create an analyzer for a newly opened trip.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            floor_pct: None,
            floor_at: None,
            emitted_floor_pct: None,
            last_soc_pct: None,
            electric_distance_m: 0.0,
            electric_kwh: 0.0,
        }
    }

    /// Process one causal reading against the open trip.
    ///
    /// `distance_delta_m` is the distance covered since the previous
    /// reading; it accrues to the electric tally whenever the committed
    /// mode is electric.
    pub fn process(
        &mut self,
        reading: &Reading,
        distance_delta_m: f64,
        trip: &Trip,
    ) -> Vec<SocTransition> {
        let mut transitions = Vec::new();

        if trip.current_mode() == PropulsionMode::Electric {
            self.electric_distance_m += distance_delta_m;
        }

        let Some(soc) = reading.soc_pct else {
            return transitions;
        };

        if let Some(prev) = self.last_soc_pct {
            let delta = soc - prev;

            if trip.current_mode() == PropulsionMode::Electric {
                if delta < 0.0 {
                    self.electric_kwh += -delta / 100.0 * self.config.pack_capacity_kwh;
                } else if delta > self.config.soc_noise_threshold_pct {
                    // SOC rising in electric mode with no charging session
                    // open is regenerative braking, not charging.
                    transitions.push(SocTransition {
                        trip_id: trip.id,
                        timestamp: reading.timestamp,
                        soc_before_pct: prev,
                        soc_after_pct: soc,
                        kind: SocTransitionKind::RegenGain,
                    });
                }
            }
        }

        if let Some(transition) = self.update_floor(soc, reading.timestamp, trip, true) {
            transitions.push(transition);
        }

        self.last_soc_pct = Some(soc);
        transitions
    }

    /// Feed an out-of-order reading: extrema tracking only.
    ///
    /// The floor value may move (a set minimum does not depend on arrival
    /// order) but no transitions are emitted and causal state is untouched.
    pub fn observe_extrema(&mut self, reading: &Reading, trip: &Trip) {
        if let Some(soc) = reading.soc_pct {
            self.update_floor(soc, reading.timestamp, trip, false);
        }
    }

    /// Record the SOC context of a committed mode switch.
    pub fn mode_switch_transition(
        &self,
        trip: &Trip,
        at: NaiveDateTime,
    ) -> Option<SocTransition> {
        let soc = self.last_soc_pct?;
        Some(SocTransition {
            trip_id: trip.id,
            timestamp: at,
            soc_before_pct: soc,
            soc_after_pct: soc,
            kind: SocTransitionKind::ModeSwitch,
        })
    }

    /// Update the running floor; emit floor_reached when allowed and the
    /// drop since the last emitted floor clears the noise threshold.
    fn update_floor(
        &mut self,
        soc: f64,
        at: NaiveDateTime,
        trip: &Trip,
        may_emit: bool,
    ) -> Option<SocTransition> {
        match self.floor_pct {
            None => {
                self.floor_pct = Some(soc);
                self.floor_at = Some(at);
                self.emitted_floor_pct = Some(soc);
                None
            }
            Some(floor) if soc < floor => {
                self.floor_pct = Some(soc);
                self.floor_at = Some(at);
                let baseline = self.emitted_floor_pct.unwrap_or(floor);
                if may_emit && baseline - soc >= self.config.soc_noise_threshold_pct {
                    self.emitted_floor_pct = Some(soc);
                    Some(SocTransition {
                        trip_id: trip.id,
                        timestamp: at,
                        soc_before_pct: baseline,
                        soc_after_pct: soc,
                        kind: SocTransitionKind::FloorReached,
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Running SOC floor, if any SOC has been seen.
    pub fn floor(&self) -> Option<(f64, NaiveDateTime)> {
        Some((self.floor_pct?, self.floor_at?))
    }

    /// Distance covered in electric mode, miles.
    pub fn electric_miles(&self) -> f64 {
        self.electric_distance_m / METERS_PER_MILE
    }

    /// Energy consumed in electric mode, kWh.
    pub fn electric_kwh(&self) -> f64 {
        self.electric_kwh
    }

    /// Electric efficiency, kWh per mile over electric segments.
    pub fn kwh_per_mile(&self) -> Option<f64> {
        let miles = self.electric_miles();
        if miles > 0.0 && self.electric_kwh > 0.0 {
            Some(self.electric_kwh / miles)
        } else {
            None
        }
    }
}
