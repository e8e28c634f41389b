//! Charging-session detection from SOC-rising-while-stationary patterns.

use crate::config::EngineConfig;
use crate::detect::smoothing::TrendTracker;
use crate::telemetry::Reading;
use crate::trip::types::ChargingSession;
use chrono::NaiveDateTime;

/// Outcome of feeding one reading to the charging detector.
#[derive(Debug)]
pub enum ChargingUpdate {
    /// Nothing changed
    None,
    /// A session opened
    Opened,
    /// The open session closed normally
    Closed(ChargingSession),
}

/// Recognizes charge start/end while no trip is open.
///
/// `Idle -> Charging` on a sustained rising SOC trend while stationary;
/// `Charging -> Idle` when the SOC plateau outlasts the grace window or
/// motion resumes. Lives per vehicle, independent of trip state.
#[derive(Debug)]
pub struct ChargingDetector {
    config: EngineConfig,
    /// Open session, if charging
    session: Option<ChargingSession>,
    /// Rising-trend run tracker while idle
    trend: TrendTracker,
    /// Reading that anchored the current rising run (timestamp, SOC)
    run_anchor: Option<(NaiveDateTime, f64)>,
    /// Last causal reading with SOC (timestamp, SOC)
    last_seen: Option<(NaiveDateTime, f64)>,
    /// Highest SOC reached while charging
    peak_soc_pct: Option<f64>,
    /// Start of the current plateau while charging
    plateau_since: Option<NaiveDateTime>,
}

impl ChargingDetector {
    /// Create a detector for one vehicle.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            session: None,
            trend: TrendTracker::new(),
            run_anchor: None,
            last_seen: None,
            peak_soc_pct: None,
            plateau_since: None,
        }
    }

    /// Whether a session is currently open.
    pub fn is_charging(&self) -> bool {
        self.session.is_some()
    }

    /// Last-update timestamp of the open session, if any.
    pub fn last_update(&self) -> Option<NaiveDateTime> {
        self.session.as_ref().map(|s| s.last_update)
    }

    /// Feed one causal reading. Out-of-order readings must not be passed
    /// here; they carry no boundary authority.
    pub fn process(&mut self, reading: &Reading) -> ChargingUpdate {
        let stationary = reading.is_stationary(self.config.stationary_epsilon_kmh);

        if self.session.is_some() {
            return match self.process_charging(reading, stationary) {
                Some(session) => ChargingUpdate::Closed(session),
                None => ChargingUpdate::None,
            };
        }

        let Some(soc) = reading.soc_pct else {
            return ChargingUpdate::None;
        };

        if !stationary {
            self.trend.reset();
            self.run_anchor = None;
            self.last_seen = Some((reading.timestamp, soc));
            return ChargingUpdate::None;
        }

        let delta = match self.last_seen {
            Some((_, prev)) => soc - prev,
            None => 0.0,
        };

        let prev_seen = self.last_seen;
        let run_before = self.trend.rising_run();
        let run = self.trend.observe(delta, self.config.soc_noise_threshold_pct);

        if run == 1 && run_before == 0 {
            // The run anchors at the reading before the first rise: that
            // is where charging actually began.
            self.run_anchor = prev_seen.or(Some((reading.timestamp, soc)));
        } else if run == 0 {
            self.run_anchor = None;
        }

        self.last_seen = Some((reading.timestamp, soc));

        if run >= self.config.charge_trend_count {
            let (anchor_ts, anchor_soc) = self
                .run_anchor
                .unwrap_or((reading.timestamp, soc));
            let mut session =
                ChargingSession::open(&reading.vehicle_id, anchor_ts, anchor_soc);
            session.last_update = reading.timestamp;
            tracing::info!(
                "Charging session opened for {} at {} (start SOC {:.1}%)",
                reading.vehicle_id,
                anchor_ts,
                anchor_soc
            );
            self.session = Some(session);
            self.peak_soc_pct = Some(soc);
            self.plateau_since = None;
            self.trend.reset();
            self.run_anchor = None;
            return ChargingUpdate::Opened;
        }

        ChargingUpdate::None
    }

    fn process_charging(
        &mut self,
        reading: &Reading,
        stationary: bool,
    ) -> Option<ChargingSession> {
        if !stationary {
            // Motion resumes: charging is over as of this reading.
            return self.close(reading.timestamp, true);
        }

        let Some(soc) = reading.soc_pct else {
            if let Some(session) = self.session.as_mut() {
                session.last_update = reading.timestamp;
            }
            return None;
        };

        let prev = self.last_seen.map(|(_, s)| s).unwrap_or(soc);
        let delta = soc - prev;
        self.last_seen = Some((reading.timestamp, soc));

        if delta > self.config.soc_noise_threshold_pct {
            // Still rising
            self.peak_soc_pct = Some(self.peak_soc_pct.map_or(soc, |p| p.max(soc)));
            self.plateau_since = None;
            if let Some(session) = self.session.as_mut() {
                session.last_update = reading.timestamp;
            }
            return None;
        }

        // Plateau (or sag): tolerated within the grace window
        let since = *self.plateau_since.get_or_insert(reading.timestamp);
        if let Some(session) = self.session.as_mut() {
            session.last_update = reading.timestamp;
        }

        let plateau_secs = (reading.timestamp - since).num_seconds();
        if plateau_secs > self.config.charge_grace_secs as i64 {
            return self.close(reading.timestamp, true);
        }

        None
    }

    /// Fold an out-of-order reading into the open session's SOC peak.
    ///
    /// A maximum is order-independent, so a late reading may still raise
    /// it. No timestamps move and no boundaries are evaluated.
    pub fn observe_extrema(&mut self, reading: &Reading) {
        if self.session.is_none() {
            return;
        }
        if let Some(soc) = reading.soc_pct {
            self.peak_soc_pct = Some(self.peak_soc_pct.map_or(soc, |p| p.max(soc)));
        }
    }

    /// Close the open session, normally or by force. Returns `None` when
    /// no session is open, which makes a repeated close a no-op.
    ///
    /// End SOC is the last rising value observed, not whatever the sensor
    /// drifted to during the plateau.
    pub fn close(&mut self, at: NaiveDateTime, complete: bool) -> Option<ChargingSession> {
        let mut session = self.session.take()?;
        session.ended_at = Some(at);
        session.closed = true;
        session.complete = complete;
        session.end_soc_pct = self.peak_soc_pct;
        if let Some(end) = self.peak_soc_pct {
            let added = (end - session.start_soc_pct).max(0.0);
            session.energy_added_kwh = Some(added / 100.0 * self.config.pack_capacity_kwh);
        }
        self.peak_soc_pct = None;
        self.plateau_since = None;
        self.trend.reset();
        self.run_anchor = None;
        tracing::info!(
            "Charging session closed for {} at {} (complete: {})",
            session.vehicle_id,
            at,
            complete
        );
        Some(session)
    }
}
