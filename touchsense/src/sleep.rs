//! Low-power wake channel.
//!
//! One channel stays monitored while the device sleeps. It runs its own copy
//! of the channel pipeline, seeded from the awake channel, with a separate
//! threshold. When proximity sensing is enabled the wake decision comes from
//! the proximity window instead of a single debounced activation.

use crate::channel::{ChannelId, ChannelState, CycleOutcome};
use crate::config::{ChannelConfig, TouchConfig};
use crate::detector::Transition;
use crate::proximity::ProximityAccumulator;

/// Result of processing one sample on the sleep channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SleepOutcome {
    pub cycle: CycleOutcome,
    /// Decision of a proximity window completed on this cycle
    pub proximity: Option<bool>,
    /// This cycle is a wake condition
    pub wake: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct SleepChannel {
    pub channel: ChannelId,
    /// Activation threshold in effect while sleeping
    pub threshold: u32,
    pub proximity: bool,
    state: Option<ChannelState>,
    accumulator: Option<ProximityAccumulator>,
}

impl SleepChannel {
    pub fn new(channel: ChannelId, threshold: u32, proximity: bool) -> Self {
        Self {
            channel,
            threshold,
            proximity,
            state: None,
            accumulator: None,
        }
    }

    pub fn sleeping(&self) -> bool {
        self.state.is_some()
    }

    /// Pipeline state while sleeping
    pub fn state(&self) -> Option<&ChannelState> {
        self.state.as_ref()
    }

    /// Arm the sleep pipeline from the awake channel's state.
    ///
    /// `accumulator` is the channel's proximity configuration, required when
    /// proximity is enabled for sleep.
    pub(crate) fn enter(&mut self, awake: &ChannelState, accumulator: Option<ProximityAccumulator>) {
        let mut state = *awake;
        state.config.hysteresis = scaled_hysteresis(&awake.config, self.threshold);
        state.config.threshold = self.threshold;
        state.detector.reset();
        self.state = Some(state);
        self.accumulator = if self.proximity {
            accumulator.map(|mut acc| {
                acc.reset();
                acc
            })
        } else {
            None
        };
    }

    pub(crate) fn exit(&mut self) {
        self.state = None;
        self.accumulator = None;
    }

    /// Snap the sleep benchmark to its latest sample
    pub fn reset_benchmark(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.reset_benchmark();
        }
    }

    /// Count a cycle whose sample was dropped as an inactive proximity cycle
    pub(crate) fn skip_cycle(&mut self) -> Option<SleepOutcome> {
        self.state.as_ref()?;
        let proximity = self.accumulator.as_mut().and_then(|acc| acc.on_cycle(false));
        Some(SleepOutcome {
            cycle: CycleOutcome {
                transition: None,
                active: false,
            },
            proximity,
            wake: self.proximity && proximity == Some(true),
        })
    }

    pub(crate) fn process(&mut self, raw: u32, config: &TouchConfig) -> Option<SleepOutcome> {
        let state = self.state.as_mut()?;
        let cycle = state.process(raw, config);
        let proximity = self
            .accumulator
            .as_mut()
            .and_then(|acc| acc.on_cycle(cycle.active));
        let wake = if self.proximity {
            proximity == Some(true)
        } else {
            cycle.transition == Some(Transition::Activated)
        };
        Some(SleepOutcome {
            cycle,
            proximity,
            wake,
        })
    }
}

/// Hysteresis for the sleep threshold, in the same proportion to it as the
/// awake hysteresis is to the awake threshold.
///
/// Always leaves a release level above zero so the channel can deactivate.
fn scaled_hysteresis(awake: &ChannelConfig, sleep_threshold: u32) -> u32 {
    let scaled = (awake.hysteresis as u64 * sleep_threshold as u64)
        .checked_div(awake.threshold as u64)
        .unwrap_or(0);
    (scaled.min(u32::MAX as u64) as u32).min(sleep_threshold.saturating_sub(1))
}
