//! Per-channel pipeline state.

use crate::benchmark::BenchmarkTracker;
use crate::config::{Calibration, ChannelConfig, TouchConfig};
use crate::detector::{ActivationDetector, DetectorState, Transition};
use crate::filter;

const SEED_FROM_NEXT: Calibration = Calibration {
    delay: 0,
    samples: 1,
};

/// Index of a sense channel within a sensor
pub type ChannelId = u8;

/// Set of channels, bit `n` for channel `n`
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelMask(pub u32);

impl ChannelMask {
    pub const NONE: Self = Self(0);

    /// Mask holding only `channel`; empty for ids outside the mask
    pub const fn single(channel: ChannelId) -> Self {
        if channel < 32 {
            Self(1 << channel)
        } else {
            Self::NONE
        }
    }

    /// Mask with the first `n` channels set
    pub const fn first(n: usize) -> Self {
        if n >= 32 {
            Self(u32::MAX)
        } else {
            Self((1 << n) - 1)
        }
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        (channel as u32) < 32 && self.0 & (1 << channel) != 0
    }

    /// Ids of 32 and above are ignored
    pub fn insert(&mut self, channel: ChannelId) {
        self.0 |= Self::single(channel).0;
    }

    pub fn remove(&mut self, channel: ChannelId) {
        self.0 &= !Self::single(channel).0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over the channel ids in the set, lowest first
    pub fn iter(&self) -> impl Iterator<Item = ChannelId> {
        let bits = self.0;
        (0..32u8).filter(move |ch| bits & (1 << ch) != 0)
    }
}

/// Selects which pipeline value to read back from a channel
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataKind {
    Raw,
    Benchmark,
    Smooth,
}

/// Outcome of processing one sample on a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleOutcome {
    pub transition: Option<Transition>,
    /// Detector considers the channel active after this cycle
    pub active: bool,
}

/// Everything the pipeline remembers about one channel between scan cycles
#[derive(Clone, Copy, Debug)]
pub struct ChannelState {
    pub enabled: bool,
    pub config: ChannelConfig,
    /// Latest sample, `None` until one arrives after enable
    pub raw: Option<u32>,
    pub smoothed: u32,
    pub benchmark: BenchmarkTracker,
    pub detector: ActivationDetector,
}

impl ChannelState {
    pub fn new(config: &TouchConfig) -> Self {
        Self {
            enabled: false,
            config: config.channel,
            raw: None,
            smoothed: 0,
            benchmark: BenchmarkTracker::new(config.calibration),
            detector: ActivationDetector::new(),
        }
    }

    /// Clear the sample history and start acquiring the benchmark again
    pub fn restart(&mut self, config: &TouchConfig) {
        self.raw = None;
        self.smoothed = 0;
        self.benchmark = BenchmarkTracker::new(config.calibration);
        self.detector.reset();
    }

    pub fn state(&self) -> DetectorState {
        self.detector.state
    }

    pub fn active(&self) -> bool {
        self.detector.active()
    }

    pub fn read(&self, kind: DataKind) -> Option<u32> {
        match kind {
            DataKind::Raw => self.raw,
            DataKind::Benchmark if self.benchmark.is_ready() => Some(self.benchmark.benchmark),
            DataKind::Benchmark => None,
            DataKind::Smooth => self.raw.map(|_| self.smoothed),
        }
    }

    /// Snap the benchmark to the latest sample.
    ///
    /// With no sample yet, the benchmark is taken from the next one.
    pub fn reset_benchmark(&mut self) {
        match self.raw {
            Some(raw) => self.benchmark.force_reset(raw),
            None => self.benchmark = BenchmarkTracker::new(SEED_FROM_NEXT),
        }
    }

    /// Run one sample through benchmark tracking, smoothing and detection
    pub fn process(&mut self, raw: u32, config: &TouchConfig) -> CycleOutcome {
        self.run(raw, config, false)
    }

    /// Like [`process`](Self::process), but a channel that is not already
    /// active is kept `Inactive` whatever its signal
    pub fn process_held_off(&mut self, raw: u32, config: &TouchConfig) -> CycleOutcome {
        self.run(raw, config, true)
    }

    fn run(&mut self, raw: u32, config: &TouchConfig, hold_off: bool) -> CycleOutcome {
        let first = self.raw.replace(raw).is_none();

        let window = config.denoise_window(self.config.threshold);
        self.benchmark.update(raw, window, config.benchmark_filter);

        self.smoothed = if first {
            raw
        } else {
            filter::smooth(self.smoothed, raw, config.filter_mode)
        };

        if !self.benchmark.is_ready() || (hold_off && !self.detector.active()) {
            self.detector.reset();
            return CycleOutcome {
                transition: None,
                active: false,
            };
        }

        let delta = config.polarity.delta(self.smoothed, self.benchmark.benchmark);
        let transition = self.detector.push(delta, &self.config);
        CycleOutcome {
            transition,
            active: self.detector.active(),
        }
    }
}
