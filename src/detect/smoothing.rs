//! Signal smoothing and trend tracking for noisy level sensors.

use std::collections::VecDeque;

/// Window-smoothed sensor level with dampened steps.
///
/// The smoothed value follows a rolling window average, but a single
/// update may never move the smoothed value by more than the raw delta of
/// that update. A jittery sensor therefore cannot drag the smoothed level
/// further than the sensor itself moved.
#[derive(Debug)]
pub struct DampedLevel {
    /// Buffer of recent raw values
    buffer: VecDeque<f64>,
    /// Window size in samples
    window_size: usize,
    /// Current smoothed value
    smoothed: Option<f64>,
    /// Last raw value seen
    last_raw: Option<f64>,
}

impl DampedLevel {
    /// Create a new damped level with the given window size.
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(window_size.max(1)),
            window_size: window_size.max(1),
            smoothed: None,
            last_raw: None,
        }
    }

    /// Feed a raw value; returns the smoothed step (new - old smoothed).
    ///
    /// The first value seeds the filter and reports a zero step.
    pub fn update(&mut self, raw: f64) -> f64 {
        let raw_delta = match self.last_raw {
            Some(prev) => raw - prev,
            None => 0.0,
        };
        self.last_raw = Some(raw);

        self.buffer.push_back(raw);
        if self.buffer.len() > self.window_size {
            self.buffer.pop_front();
        }

        let window_avg = self.buffer.iter().sum::<f64>() / self.buffer.len() as f64;

        let step = match self.smoothed {
            None => {
                self.smoothed = Some(raw);
                0.0
            }
            Some(prev) => {
                // Clamp the smoothed step to the magnitude of the raw delta
                let wanted = window_avg - prev;
                let limit = raw_delta.abs();
                let step = wanted.clamp(-limit, limit);
                self.smoothed = Some(prev + step);
                step
            }
        };

        step
    }

    /// Re-seed the filter at a new level, discarding history.
    ///
    /// Used when a genuine step change (refuel) makes the old baseline
    /// meaningless.
    pub fn rebase(&mut self, level: f64) {
        self.buffer.clear();
        self.buffer.push_back(level);
        self.smoothed = Some(level);
        self.last_raw = Some(level);
    }

    /// Current smoothed value, if any value has been seen.
    pub fn value(&self) -> Option<f64> {
        self.smoothed
    }

    /// Last raw value fed in.
    pub fn last_raw(&self) -> Option<f64> {
        self.last_raw
    }

    /// Reset to the empty state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.smoothed = None;
        self.last_raw = None;
    }
}

/// Tracks the length of a consecutive rising run in a level signal.
///
/// A delta above the noise threshold extends the run; a delta at or below
/// it (plateau or decline) resets the run to zero.
#[derive(Debug, Default)]
pub struct TrendTracker {
    rising_run: u32,
}

impl TrendTracker {
    /// Create a fresh tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a delta; returns the current rising-run length.
    pub fn observe(&mut self, delta: f64, noise_threshold: f64) -> u32 {
        if delta > noise_threshold {
            self.rising_run += 1;
        } else {
            self.rising_run = 0;
        }
        self.rising_run
    }

    /// Current rising-run length.
    pub fn rising_run(&self) -> u32 {
        self.rising_run
    }

    /// Reset the run to zero.
    pub fn reset(&mut self) {
        self.rising_run = 0;
    }
}
