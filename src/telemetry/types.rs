//! Raw and normalized telemetry reading types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A reading as it arrives on the wire, before validation.
///
/// Everything is optional at this stage; the normalizer decides what is
/// required and what is merely absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawReading {
    /// Vehicle identity (VIN or logger id)
    pub vehicle_id: Option<String>,
    /// Timestamp string, RFC 3339 or naive `YYYY-MM-DDTHH:MM:SS`
    pub timestamp: Option<String>,
    /// Latitude in degrees
    pub latitude: Option<f64>,
    /// Longitude in degrees
    pub longitude: Option<f64>,
    /// Speed in km/h
    pub speed_kmh: Option<f64>,
    /// Fuel level percentage (0-100)
    pub fuel_level_pct: Option<f64>,
    /// Battery state of charge percentage (0-100)
    pub soc_pct: Option<f64>,
    /// Pack voltage in volts
    pub pack_voltage: Option<f64>,
    /// Per-cell voltages in volts, in pack order
    pub cell_voltages: Option<Vec<f64>>,
    /// Ambient temperature in Celsius
    pub ambient_temp_c: Option<f64>,
    /// Odometer in meters
    pub odometer_m: Option<f64>,
}

/// A validated, canonicalized reading.
///
/// Immutable once produced: detectors read it, nothing mutates it. All
/// timestamps are naive UTC so the core never mixes aware and naive values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// Vehicle identity
    pub vehicle_id: String,
    /// Reading timestamp, naive UTC
    pub timestamp: NaiveDateTime,
    /// Latitude in degrees
    pub latitude: Option<f64>,
    /// Longitude in degrees
    pub longitude: Option<f64>,
    /// Speed in km/h
    pub speed_kmh: Option<f64>,
    /// Fuel level percentage (0-100)
    pub fuel_level_pct: Option<f64>,
    /// Battery state of charge percentage (0-100)
    pub soc_pct: Option<f64>,
    /// Pack voltage in volts
    pub pack_voltage: Option<f64>,
    /// Per-cell voltages in volts, in pack order
    pub cell_voltages: Option<Vec<f64>>,
    /// Ambient temperature in Celsius
    pub ambient_temp_c: Option<f64>,
    /// Odometer in meters
    pub odometer_m: Option<f64>,
    /// True if this reading arrived at or behind the vehicle's last-seen
    /// timestamp. Flagged readings feed extrema tracking only and never
    /// drive open/close decisions.
    pub out_of_order: bool,
}

impl Reading {
    /// Whether the vehicle is stationary at the given speed epsilon.
    ///
    /// A missing speed counts as stationary: absence of a motion signal is
    /// not evidence of motion.
    pub fn is_stationary(&self, epsilon_kmh: f64) -> bool {
        self.speed_kmh.map(|s| s <= epsilon_kmh).unwrap_or(true)
    }
}

/// Errors raised while validating a raw reading.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Timestamp field missing entirely
    #[error("Reading has no timestamp")]
    MissingTimestamp,

    /// Timestamp present but unparseable
    #[error("Unparseable timestamp: {0}")]
    BadTimestamp(String),

    /// Vehicle identity missing
    #[error("Reading has no vehicle id")]
    MissingVehicleId,

    /// None of speed, fuel level or SOC present
    #[error("Reading carries no usable signal (need speed, fuel level or SOC)")]
    NoSignal,

    /// Numeric field outside physically plausible bounds
    #[error("Field {field} out of range: {value}")]
    OutOfRange {
        /// Offending field name
        field: &'static str,
        /// Offending value
        value: f64,
    },
}
