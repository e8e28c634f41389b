//! Reading validation and canonicalization.

use crate::telemetry::types::{RawReading, Reading, ValidationError};
use chrono::{DateTime, NaiveDateTime};
use std::collections::HashMap;

/// Validates raw readings and converts them to the canonical form.
///
/// Pure transform apart from the per-vehicle last-seen table used to flag
/// out-of-order arrivals. Rejected readings never reach a detector.
#[derive(Debug, Default)]
pub struct ReadingNormalizer {
    /// Highest timestamp seen so far, per vehicle
    last_seen: HashMap<String, NaiveDateTime>,
}

impl ReadingNormalizer {
    /// Create a new normalizer with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and canonicalize one raw reading.
    ///
    /// Out-of-order readings (timestamp at or behind the vehicle's
    /// last-seen timestamp) are accepted but flagged, not rejected:
    /// ingestion order only matches causal order up to a jitter window.
    pub fn normalize(&mut self, raw: &RawReading) -> Result<Reading, ValidationError> {
        let vehicle_id = raw
            .vehicle_id
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(ValidationError::MissingVehicleId)?
            .to_string();

        let raw_ts = raw.timestamp.as_deref().ok_or(ValidationError::MissingTimestamp)?;
        let timestamp = parse_timestamp(raw_ts)?;

        if raw.speed_kmh.is_none() && raw.fuel_level_pct.is_none() && raw.soc_pct.is_none() {
            return Err(ValidationError::NoSignal);
        }

        check_range("speed_kmh", raw.speed_kmh, 0.0, 400.0)?;
        check_range("fuel_level_pct", raw.fuel_level_pct, 0.0, 100.0)?;
        check_range("soc_pct", raw.soc_pct, 0.0, 100.0)?;
        check_range("latitude", raw.latitude, -90.0, 90.0)?;
        check_range("longitude", raw.longitude, -180.0, 180.0)?;
        check_range("pack_voltage", raw.pack_voltage, 0.0, 1000.0)?;
        check_range("ambient_temp_c", raw.ambient_temp_c, -60.0, 80.0)?;
        check_range("odometer_m", raw.odometer_m, 0.0, f64::MAX)?;

        if let Some(cells) = &raw.cell_voltages {
            for &v in cells {
                if !(0.5..=6.0).contains(&v) || v.is_nan() {
                    return Err(ValidationError::OutOfRange {
                        field: "cell_voltages",
                        value: v,
                    });
                }
            }
        }

        let out_of_order = match self.last_seen.get(&vehicle_id) {
            Some(&last) if timestamp <= last => true,
            _ => {
                self.last_seen.insert(vehicle_id.clone(), timestamp);
                false
            }
        };

        if out_of_order {
            tracing::debug!(
                "Out-of-order reading for {} at {} (informational only)",
                vehicle_id,
                timestamp
            );
        }

        Ok(Reading {
            vehicle_id,
            timestamp,
            latitude: raw.latitude,
            longitude: raw.longitude,
            speed_kmh: raw.speed_kmh,
            fuel_level_pct: raw.fuel_level_pct,
            soc_pct: raw.soc_pct,
            pack_voltage: raw.pack_voltage,
            cell_voltages: raw.cell_voltages.clone(),
            ambient_temp_c: raw.ambient_temp_c,
            odometer_m: raw.odometer_m,
            out_of_order,
        })
    }
}

/// Parse an RFC 3339 or naive timestamp into naive UTC.
///
/// Aware timestamps are converted to UTC and the offset dropped, so the
/// core never compares aware against naive values.
fn parse_timestamp(text: &str) -> Result<NaiveDateTime, ValidationError> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(text) {
        return Ok(aware.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| ValidationError::BadTimestamp(text.to_string()))
}

fn check_range(
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if let Some(v) = value {
        if !(min..=max).contains(&v) || v.is_nan() {
            return Err(ValidationError::OutOfRange { field, value: v });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(vehicle: &str, ts: &str, soc: f64) -> RawReading {
        RawReading {
            vehicle_id: Some(vehicle.to_string()),
            timestamp: Some(ts.to_string()),
            soc_pct: Some(soc),
            ..Default::default()
        }
    }

    #[test]
    fn test_accepts_naive_and_aware_timestamps() {
        let mut normalizer = ReadingNormalizer::new();

        let naive = normalizer.normalize(&raw("veh-1", "2024-03-01T08:00:00", 70.0)).unwrap();
        let aware = normalizer
            .normalize(&raw("veh-1", "2024-03-01T03:00:05-05:00", 69.0))
            .unwrap();

        // -05:00 offset folds into UTC: 03:00:05-05:00 == 08:00:05 UTC
        assert_eq!(aware.timestamp - naive.timestamp, chrono::Duration::seconds(5));
    }

    #[test]
    fn test_rejects_missing_vehicle_and_timestamp() {
        let mut normalizer = ReadingNormalizer::new();

        let mut r = raw("veh-1", "2024-03-01T08:00:00", 70.0);
        r.vehicle_id = None;
        assert!(matches!(
            normalizer.normalize(&r),
            Err(ValidationError::MissingVehicleId)
        ));

        let mut r = raw("veh-1", "2024-03-01T08:00:00", 70.0);
        r.timestamp = None;
        assert!(matches!(
            normalizer.normalize(&r),
            Err(ValidationError::MissingTimestamp)
        ));
    }

    #[test]
    fn test_rejects_out_of_range_soc() {
        let mut normalizer = ReadingNormalizer::new();
        let result = normalizer.normalize(&raw("veh-1", "2024-03-01T08:00:00", 104.0));
        assert!(matches!(
            result,
            Err(ValidationError::OutOfRange { field: "soc_pct", .. })
        ));
    }

    #[test]
    fn test_requires_at_least_one_signal() {
        let mut normalizer = ReadingNormalizer::new();
        let r = RawReading {
            vehicle_id: Some("veh-1".to_string()),
            timestamp: Some("2024-03-01T08:00:00".to_string()),
            latitude: Some(45.0),
            longitude: Some(-122.0),
            ..Default::default()
        };
        assert!(matches!(normalizer.normalize(&r), Err(ValidationError::NoSignal)));
    }

    #[test]
    fn test_flags_out_of_order_per_vehicle() {
        let mut normalizer = ReadingNormalizer::new();

        let first = normalizer.normalize(&raw("veh-1", "2024-03-01T08:01:00", 70.0)).unwrap();
        assert!(!first.out_of_order);

        // Earlier timestamp on the same vehicle is flagged
        let late = normalizer.normalize(&raw("veh-1", "2024-03-01T08:00:30", 71.0)).unwrap();
        assert!(late.out_of_order);

        // Different vehicle has independent history
        let other = normalizer.normalize(&raw("veh-2", "2024-03-01T08:00:00", 60.0)).unwrap();
        assert!(!other.out_of_order);

        // Progress resumes after the flagged reading
        let next = normalizer.normalize(&raw("veh-1", "2024-03-01T08:02:00", 69.0)).unwrap();
        assert!(!next.out_of_order);
    }

    #[test]
    fn test_rejects_implausible_cell_voltage() {
        let mut normalizer = ReadingNormalizer::new();
        let mut r = raw("veh-1", "2024-03-01T08:00:00", 70.0);
        r.cell_voltages = Some(vec![3.9, 3.9, 12.0]);
        assert!(matches!(
            normalizer.normalize(&r),
            Err(ValidationError::OutOfRange { field: "cell_voltages", .. })
        ));
    }
}
