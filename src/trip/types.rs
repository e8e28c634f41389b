//! Persisted entity shapes: trips, mode segments, fuel events, SOC
//! transitions and charging sessions.
//!
//! Field names and types here are the durable contract with the
//! persistence layer; detectors must not invent or drop fields when
//! writing these out.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Propulsion mode within a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropulsionMode {
    /// Battery-electric propulsion
    Electric,
    /// Gas engine running
    Gas,
}

impl std::fmt::Display for PropulsionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropulsionMode::Electric => write!(f, "electric"),
            PropulsionMode::Gas => write!(f, "gas"),
        }
    }
}

/// A maximal time range within a trip where propulsion mode is constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSegment {
    /// Propulsion mode for the whole segment
    pub mode: PropulsionMode,
    /// Segment start, naive UTC
    pub started_at: NaiveDateTime,
    /// Segment end; open while the trip is live
    pub ended_at: Option<NaiveDateTime>,
}

/// Whether enrichment data was applied to a closed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    /// Not yet attempted
    #[default]
    Pending,
    /// Applied successfully
    Applied,
    /// Collaborators exhausted retries or timed out
    Unavailable,
}

/// One contiguous driving episode from motion onset to confirmed stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    /// Unique identifier
    pub id: Uuid,
    /// Vehicle this trip belongs to
    pub vehicle_id: String,
    /// Trip start, naive UTC
    pub started_at: NaiveDateTime,
    /// Trip end; None while the trip is open
    pub ended_at: Option<NaiveDateTime>,
    /// Terminal flag; a closed trip is never reopened
    pub closed: bool,
    /// Timestamp of the last causal reading applied to this trip
    pub last_update: NaiveDateTime,
    /// Ordered propulsion-mode segments
    pub mode_segments: Vec<ModeSegment>,
    /// Total distance in meters
    pub distance_m: f64,
    /// Gas mileage over gas-mode segments only
    pub gas_mpg: Option<f64>,
    /// Distance covered in electric mode, in miles
    pub electric_miles: f64,
    /// Energy consumed in electric mode, in kWh
    pub electric_kwh: f64,
    /// Electric efficiency over electric-mode segments only
    pub kwh_per_mile: Option<f64>,
    /// Minimum SOC observed during the trip
    pub soc_floor_pct: Option<f64>,
    /// When the SOC floor was observed
    pub soc_floor_at: Option<NaiveDateTime>,
    /// Average ambient temperature from onboard samples
    pub avg_ambient_temp_c: Option<f64>,
    /// True if closed by a normal boundary, false if force-closed by the sweep
    pub complete: bool,
    /// Temperature from the weather collaborator, when applied
    pub weather_temp_c: Option<f64>,
    /// Conditions string from the weather collaborator, when applied
    pub weather_conditions: Option<String>,
    /// Cumulative elevation gain along the track, in meters
    pub elevation_gain_m: Option<f64>,
    /// Cumulative elevation loss along the track, in meters
    pub elevation_loss_m: Option<f64>,
    /// Enrichment outcome
    pub enrichment: EnrichmentStatus,
}

impl Trip {
    /// Open a new trip starting at the given reading timestamp.
    ///
    /// The first mode segment opens in electric mode; the fuel-mode
    /// detector reclassifies it once the consumption proxy says otherwise.
    pub fn open(vehicle_id: &str, started_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id: vehicle_id.to_string(),
            started_at,
            ended_at: None,
            closed: false,
            last_update: started_at,
            mode_segments: vec![ModeSegment {
                mode: PropulsionMode::Electric,
                started_at,
                ended_at: None,
            }],
            distance_m: 0.0,
            gas_mpg: None,
            electric_miles: 0.0,
            electric_kwh: 0.0,
            kwh_per_mile: None,
            soc_floor_pct: None,
            soc_floor_at: None,
            avg_ambient_temp_c: None,
            complete: false,
            weather_temp_c: None,
            weather_conditions: None,
            elevation_gain_m: None,
            elevation_loss_m: None,
            enrichment: EnrichmentStatus::default(),
        }
    }

    /// Mode of the currently open segment.
    pub fn current_mode(&self) -> PropulsionMode {
        self.mode_segments
            .last()
            .map(|s| s.mode)
            .unwrap_or(PropulsionMode::Electric)
    }

    /// Close the open mode segment and start one in the new mode.
    pub fn switch_mode(&mut self, mode: PropulsionMode, at: NaiveDateTime) {
        if let Some(open) = self.mode_segments.last_mut() {
            open.ended_at = Some(at);
        }
        self.mode_segments.push(ModeSegment {
            mode,
            started_at: at,
            ended_at: None,
        });
    }

    /// Seal the trailing mode segment at trip close.
    pub fn seal_segments(&mut self, at: NaiveDateTime) {
        if let Some(open) = self.mode_segments.last_mut() {
            if open.ended_at.is_none() {
                open.ended_at = Some(at);
            }
        }
    }
}

/// Kind of fuel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelEventKind {
    /// Mode committed electric -> gas
    GasModeEntry,
    /// Mode committed gas -> electric
    GasModeExit,
    /// Fuel added while stationary
    Refuel,
}

impl std::fmt::Display for FuelEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuelEventKind::GasModeEntry => write!(f, "gas_mode_entry"),
            FuelEventKind::GasModeExit => write!(f, "gas_mode_exit"),
            FuelEventKind::Refuel => write!(f, "refuel"),
        }
    }
}

/// An append-only fuel event attributed to a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelEvent {
    /// Owning trip
    pub trip_id: Uuid,
    /// Event timestamp, naive UTC
    pub timestamp: NaiveDateTime,
    /// Event kind
    pub kind: FuelEventKind,
    /// Fuel-level delta in percent
    pub magnitude_pct: f64,
}

/// Kind of SOC transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocTransitionKind {
    /// New SOC minimum at least the noise threshold below the previous floor
    FloorReached,
    /// SOC rose in electric mode with no charging session open
    RegenGain,
    /// Propulsion-mode switch committed
    ModeSwitch,
}

impl std::fmt::Display for SocTransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocTransitionKind::FloorReached => write!(f, "floor_reached"),
            SocTransitionKind::RegenGain => write!(f, "regen_gain"),
            SocTransitionKind::ModeSwitch => write!(f, "mode_switch"),
        }
    }
}

/// An append-only SOC transition attributed to a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocTransition {
    /// Owning trip
    pub trip_id: Uuid,
    /// Transition timestamp, naive UTC
    pub timestamp: NaiveDateTime,
    /// SOC before the transition
    pub soc_before_pct: f64,
    /// SOC after the transition
    pub soc_after_pct: f64,
    /// Transition kind
    pub kind: SocTransitionKind,
}

/// A charging episode recognized from rising SOC while stationary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingSession {
    /// Unique identifier
    pub id: Uuid,
    /// Vehicle this session belongs to
    pub vehicle_id: String,
    /// Session start, naive UTC
    pub started_at: NaiveDateTime,
    /// Session end; None while open
    pub ended_at: Option<NaiveDateTime>,
    /// Terminal flag
    pub closed: bool,
    /// Timestamp of the last causal reading applied to this session
    pub last_update: NaiveDateTime,
    /// SOC when charging began
    pub start_soc_pct: f64,
    /// SOC when charging ended
    pub end_soc_pct: Option<f64>,
    /// Energy-added estimate from SOC delta and pack capacity
    pub energy_added_kwh: Option<f64>,
    /// True if closed by its normal boundary, false if force-closed
    pub complete: bool,
}

impl ChargingSession {
    /// Open a new session.
    pub fn open(vehicle_id: &str, started_at: NaiveDateTime, start_soc_pct: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id: vehicle_id.to_string(),
            started_at,
            ended_at: None,
            closed: false,
            last_update: started_at,
            start_soc_pct,
            end_soc_pct: None,
            energy_added_kwh: None,
            complete: false,
        }
    }
}
