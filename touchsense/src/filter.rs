//! Smoothing filter.
//!
//! Produces the value the activation detector compares against the benchmark.
//! The filter holds no state of its own: the previous smoothed value lives in
//! the channel state and is passed back in every cycle.

use crate::config::FilterMode;

/// Compute the next smoothed value from the previous one and a new raw sample
pub fn smooth(previous: u32, raw: u32, mode: FilterMode) -> u32 {
    match mode {
        FilterMode::Passthrough => raw,
        FilterMode::JitterStep(step) => step_toward(previous, raw, step as u32),
        FilterMode::Level(level) => {
            let diff = raw as i64 - previous as i64;
            (previous as i64 + div_away_from_zero(diff, level as u32)) as u32
        }
    }
}

/// Move `from` toward `to` by at most `step`
pub(crate) fn step_toward(from: u32, to: u32, step: u32) -> u32 {
    if to > from {
        from + (to - from).min(step)
    } else {
        from - (from - to).min(step)
    }
}

/// `value / 2^shift`, rounding away from zero so a non-zero difference always
/// produces at least one count of movement.
pub(crate) fn div_away_from_zero(value: i64, shift: u32) -> i64 {
    let divisor = 1i64 << shift;
    let magnitude = (value.abs() + divisor - 1) >> shift;
    if value < 0 {
        -magnitude
    } else {
        magnitude
    }
}
