//! Staleness sweeps paced by stream time.
//!
//! Replayed logs carry historical timestamps, so staleness has to be
//! measured on the stream's own clock. A wall-clock timer would see every
//! open trip in a historical log as stale and force-close it mid-replay.

use crate::engine::{EngineError, SweepReport, TelemetryEngine};
use chrono::NaiveDateTime;

/// Runs `sweep_once` each time stream time advances a full interval.
pub struct StreamSweeper {
    interval_secs: u32,
    last_sweep: Option<NaiveDateTime>,
}

impl StreamSweeper {
    /// Create a sweeper with the configured sweep interval.
    pub fn new(interval_secs: u32) -> Self {
        Self {
            interval_secs: interval_secs.max(1),
            last_sweep: None,
        }
    }

    /// Observe the current stream time; sweeps when a full interval has
    /// elapsed since the previous sweep.
    ///
    /// The first observation only seeds the cadence. A storage failure
    /// from the sweep propagates; everything else is handled inside
    /// `sweep_once`.
    pub async fn advance(
        &mut self,
        engine: &TelemetryEngine,
        now: NaiveDateTime,
    ) -> Result<Option<SweepReport>, EngineError> {
        let last = *self.last_sweep.get_or_insert(now);
        if (now - last).num_seconds() < self.interval_secs as i64 {
            return Ok(None);
        }

        self.last_sweep = Some(now);
        let report = engine.sweep_once(now).await?;
        if report.trips_closed > 0 || report.sessions_closed > 0 {
            tracing::info!(
                "Sweep closed {} trip(s), {} session(s) across {} vehicle(s)",
                report.trips_closed,
                report.sessions_closed,
                report.swept
            );
        }

        Ok(Some(report))
    }
}
