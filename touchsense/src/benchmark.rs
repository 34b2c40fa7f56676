//! Benchmark (no-touch baseline) tracking.
//!
//! After a channel is enabled the benchmark is acquired by discarding a few
//! startup samples and averaging a calibration window. From then on it follows
//! slow drift, but only with samples the denoise window judges non-transient:
//! a touch must not be absorbed into the baseline.

use crate::config::{BenchmarkFilter, Calibration};
use crate::filter::div_away_from_zero;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BenchmarkPhase {
    /// Discarding samples; payload is the number left to discard
    Startup(u16),
    /// Averaging samples; payload is the number left to collect
    Calibrate(u16),
    /// Benchmark is valid and tracking
    Tracking,
}

#[derive(Clone, Copy, Debug)]
pub struct BenchmarkTracker {
    pub benchmark: u32,
    pub phase: BenchmarkPhase,
    calibration: Calibration,
    sum: u64,
}

impl BenchmarkTracker {
    pub fn new(calibration: Calibration) -> Self {
        let mut tracker = Self {
            benchmark: 0,
            phase: BenchmarkPhase::Tracking,
            calibration,
            sum: 0,
        };
        tracker.restart();
        tracker
    }

    /// Forget the benchmark and acquire it again from the next samples
    pub fn restart(&mut self) {
        self.sum = 0;
        self.phase = if self.calibration.delay > 0 {
            BenchmarkPhase::Startup(self.calibration.delay)
        } else {
            BenchmarkPhase::Calibrate(self.calibration.samples.max(1))
        };
    }

    pub fn is_ready(&self) -> bool {
        self.phase == BenchmarkPhase::Tracking
    }

    /// Set the benchmark to `raw` immediately, bypassing denoise and calibration
    pub fn force_reset(&mut self, raw: u32) {
        self.benchmark = raw;
        self.sum = 0;
        self.phase = BenchmarkPhase::Tracking;
    }

    /// Feed one raw sample.
    ///
    /// `window` is the denoise window: `None` trusts every sample, otherwise a
    /// sample further than `window` counts from the benchmark is treated as a
    /// transient and ignored. Returns true if the benchmark changed.
    pub fn update(&mut self, raw: u32, window: Option<u32>, filter: BenchmarkFilter) -> bool {
        match self.phase {
            BenchmarkPhase::Startup(counter) => {
                self.phase = if counter <= 1 {
                    BenchmarkPhase::Calibrate(self.calibration.samples.max(1))
                } else {
                    BenchmarkPhase::Startup(counter - 1)
                };
                false
            }
            BenchmarkPhase::Calibrate(counter) => {
                self.sum += raw as u64;
                if counter <= 1 {
                    let samples = self.calibration.samples.max(1) as u64;
                    self.benchmark = (self.sum / samples) as u32;
                    self.sum = 0;
                    self.phase = BenchmarkPhase::Tracking;
                    true
                } else {
                    self.phase = BenchmarkPhase::Calibrate(counter - 1);
                    false
                }
            }
            BenchmarkPhase::Tracking => {
                let delta = raw as i64 - self.benchmark as i64;
                if delta == 0 {
                    return false;
                }
                if let Some(window) = window {
                    if delta.unsigned_abs() > window as u64 {
                        return false;
                    }
                }
                let step = div_away_from_zero(delta, filter.shift());
                self.benchmark = (self.benchmark as i64 + step) as u32;
                true
            }
        }
    }
}
