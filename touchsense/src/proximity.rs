//! Proximity accumulation.
//!
//! A proximity channel trades latency for noise immunity: instead of reacting
//! to the detector directly, it counts how many cycles of a fixed window found
//! the channel active and makes one decision per window. Windows do not
//! overlap; each decision is computed from scratch.

use crate::error::{Error, Result};

/// At most this many channels can be designated for proximity sensing
pub const MAX_PROXIMITY_CHANNELS: usize = 3;

#[derive(Clone, Copy, Debug)]
pub struct ProximityAccumulator {
    /// Cycles in the current window that found the channel active
    pub accumulator: u32,
    /// Cycles counted so far in the current window
    pub cycles: u32,
    total_cycles: u32,
    /// Detect fraction in parts per thousand
    permille: u32,
    result: Option<bool>,
}

impl ProximityAccumulator {
    /// Create an accumulator deciding every `total_cycles` cycles.
    ///
    /// A window is a detection when at least `detect_fraction` of its cycles
    /// found the channel active.
    pub fn new(total_cycles: u32, detect_fraction: f32) -> Result<Self> {
        // Written so that NaN fails too
        if total_cycles == 0 || !(0.0..=1.0).contains(&detect_fraction) {
            return Err(Error::InvalidConfiguration);
        }
        Ok(Self {
            accumulator: 0,
            cycles: 0,
            total_cycles,
            permille: (detect_fraction * 1000.0 + 0.5) as u32,
            result: None,
        })
    }

    pub fn total_cycles(&self) -> u32 {
        self.total_cycles
    }

    /// Count one scan cycle. Returns the window decision when this cycle completes a window.
    pub fn on_cycle(&mut self, active: bool) -> Option<bool> {
        self.cycles += 1;
        if active {
            self.accumulator += 1;
        }
        if self.cycles < self.total_cycles {
            return None;
        }

        let detected =
            self.accumulator as u64 * 1000 >= self.permille as u64 * self.total_cycles as u64;
        self.accumulator = 0;
        self.cycles = 0;
        self.result = Some(detected);
        Some(detected)
    }

    /// Take the decision of the last completed window, if one completed since the last call
    pub fn take_result(&mut self) -> Option<bool> {
        self.result.take()
    }

    /// Abandon the current window
    pub fn reset(&mut self) {
        self.accumulator = 0;
        self.cycles = 0;
        self.result = None;
    }
}
