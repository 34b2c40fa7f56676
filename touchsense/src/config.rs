//! Pipeline configuration.
//!
//! Configuration is split in two: [`TouchConfig`] holds the process-wide filter
//! and detection settings, [`ChannelConfig`] holds what differs per sense line.
//! Both are plain `Copy` structs so they can live in `static`s.

use crate::error::{Error, Result};

/// Largest accepted [`FilterMode::JitterStep`] size
pub const MAX_JITTER_STEP: u8 = 15;
/// Largest accepted [`FilterMode::Level`]
pub const MAX_SMOOTH_LEVEL: u8 = 3;
/// Largest debounce count the signed debounce counter can represent
pub const MAX_DEBOUNCE: u8 = i8::MAX as u8;
/// Number of entries in a [`DenoisePolicy`] table
pub const DENOISE_LEVELS: usize = 5;

/// Smoothing filter applied to raw samples before the activation decision
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    /// The smoothed value is the raw sample
    Passthrough,
    /// The smoothed value moves toward the raw sample by at most this many counts per cycle
    JitterStep(u8),
    /// Exponential smoothing with weight `1 / 2^level` on the new sample
    Level(u8),
}

impl FilterMode {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Passthrough => Ok(()),
            Self::JitterStep(step) if step <= MAX_JITTER_STEP => Ok(()),
            Self::Level(level) if level <= MAX_SMOOTH_LEVEL => Ok(()),
            _ => Err(Error::InvalidConfiguration),
        }
    }
}

/// How far the benchmark moves toward a sample judged non-transient
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BenchmarkFilter {
    /// Benchmark takes the sample value
    Immediate = 0,
    Iir4 = 2,
    Iir8 = 3,
    Iir16 = 4,
    Iir32 = 5,
    Iir64 = 6,
    Iir128 = 7,
    Iir256 = 8,
}

impl BenchmarkFilter {
    /// Right shift applied to the benchmark delta
    pub fn shift(&self) -> u32 {
        *self as u32
    }
}

/// Direction in which a touch moves the raw reading
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    /// Touch increases the reading
    Rising,
    /// Touch decreases the reading (charge-transfer counters such as the STM32 TSC)
    Falling,
}

impl Polarity {
    /// Signal above benchmark in the touch direction.
    ///
    /// Saturates at zero; movement away from the touch direction is noise.
    pub fn delta(&self, value: u32, benchmark: u32) -> u32 {
        match self {
            Self::Rising => value.saturating_sub(benchmark),
            Self::Falling => benchmark.saturating_sub(value),
        }
    }
}

/// Initial benchmark acquisition after a channel is enabled
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Calibration {
    /// Number of samples to discard after enable before calibrating
    pub delay: u16,
    /// Number of samples averaged into the initial benchmark
    pub samples: u16,
}

/// Maps a denoise level to the window, in eighths of the channel threshold,
/// inside which a sample is trusted to update the benchmark.
///
/// `None` means the level always updates the benchmark.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DenoisePolicy {
    pub eighths: [Option<u8>; DENOISE_LEVELS],
}

impl DenoisePolicy {
    pub const fn default() -> Self {
        Self {
            eighths: [None, Some(4), Some(3), Some(2), Some(1)],
        }
    }

    /// Benchmark update window for `level` on a channel with `threshold`.
    ///
    /// Returns `None` for an always-update level. Callers validate `level`.
    pub fn window(&self, level: u8, threshold: u32) -> Option<u32> {
        self.eighths
            .get(level as usize)
            .copied()
            .flatten()
            .map(|eighths| ((threshold as u64 * eighths as u64) / 8).min(u32::MAX as u64) as u32)
    }
}

/// Detection parameters for one channel
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Counts of signal above benchmark required to activate
    pub threshold: u32,
    /// Once active, the signal must fall below `threshold - hysteresis` to deactivate
    pub hysteresis: u32,
    /// Consecutive qualifying cycles required to commit a transition
    pub debounce: u8,
}

impl ChannelConfig {
    pub const fn new(threshold: u32, hysteresis: u32, debounce: u8) -> Self {
        Self {
            threshold,
            hysteresis,
            debounce,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.debounce > MAX_DEBOUNCE {
            return Err(Error::InvalidConfiguration);
        }
        Ok(())
    }

    /// Signal level below which an active channel starts deactivating
    pub fn release_threshold(&self) -> u32 {
        self.threshold.saturating_sub(self.hysteresis)
    }
}

/// Process-wide configuration for all touch channels
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchConfig {
    /// Smoothing filter producing the value used for activation
    pub filter_mode: FilterMode,
    /// Rate at which a trusted sample pulls the benchmark
    pub benchmark_filter: BenchmarkFilter,
    /// Index into `denoise`
    pub denoise_level: u8,
    pub denoise: DenoisePolicy,
    /// Channel settings used when a channel is enabled without `configure_channel`
    pub channel: ChannelConfig,
    pub polarity: Polarity,
    pub calibration: Calibration,
    /// Samples above this value are treated as a measurement timeout and dropped
    pub timeout: Option<u32>,
}

impl TouchConfig {
    pub const fn default() -> Self {
        Self {
            filter_mode: FilterMode::Level(1),
            benchmark_filter: BenchmarkFilter::Immediate,
            denoise_level: 1,
            denoise: DenoisePolicy::default(),
            channel: ChannelConfig::new(100, 5, 2),
            polarity: Polarity::Rising,
            calibration: Calibration {
                delay: 0,
                samples: 1,
            },
            timeout: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.filter_mode.validate()?;
        self.channel.validate()?;
        if self.denoise_level as usize >= DENOISE_LEVELS || self.calibration.samples == 0 {
            return Err(Error::InvalidConfiguration);
        }
        Ok(())
    }

    /// Benchmark update window for a channel with `threshold` at the configured denoise level
    pub fn denoise_window(&self, threshold: u32) -> Option<u32> {
        self.denoise.window(self.denoise_level, threshold)
    }
}

pub const DEFAULT_TOUCH_CONFIG: TouchConfig = TouchConfig::default();
