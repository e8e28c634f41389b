//! Trip finalization: fills derived aggregates at close time.

use crate::detect::{FuelModeDetector, SocAnalyzer};
use crate::trip::types::Trip;
use chrono::NaiveDateTime;

/// Seal a trip at its end boundary and fill the derived aggregates from
/// the per-trip detectors.
///
/// Finalization is pure bookkeeping over already-accumulated state; it
/// never touches the network or the store, so a close can never stall on
/// a collaborator.
pub fn finalize_trip(
    trip: &mut Trip,
    fuel: &FuelModeDetector,
    soc: &SocAnalyzer,
    ambient_sum_c: f64,
    ambient_count: u32,
    end: NaiveDateTime,
    complete: bool,
) {
    trip.ended_at = Some(end);
    trip.closed = true;
    trip.complete = complete;
    trip.seal_segments(end);

    trip.gas_mpg = fuel.gas_mpg();
    trip.electric_miles = soc.electric_miles();
    trip.electric_kwh = soc.electric_kwh();
    trip.kwh_per_mile = soc.kwh_per_mile();

    if let Some((floor, at)) = soc.floor() {
        trip.soc_floor_pct = Some(floor);
        trip.soc_floor_at = Some(at);
    }

    if ambient_count > 0 {
        trip.avg_ambient_temp_c = Some(ambient_sum_c / ambient_count as f64);
    }

    tracing::debug!(
        "Finalized trip {}: {:.1} m, {:.2} electric mi, mpg {:?}",
        trip.id,
        trip.distance_m,
        trip.electric_miles,
        trip.gas_mpg
    );
}
