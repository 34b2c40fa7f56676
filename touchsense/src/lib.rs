//! Capacitive touch sensing pipeline.
//!
//! Raw capacitance readings come from a [`SampleSource`] and flow through a
//! fixed per-channel pipeline:
//!
//! ```text
//! raw -> benchmark tracking (gated by denoise) -> smoothing -> delta -> debounced detector
//! ```
//!
//! Detector output feeds the active mask, the event queue and, for designated
//! channels, a proximity accumulator. A single channel can be kept running
//! during sleep with its own threshold and acts as the wake source.
//!
//! The crate is `no_std`. Logging goes through `defmt` or `log`, selected by
//! the crate feature of the same name. With the `stm32f0x1` or `stm32f303`
//! feature, [`tsc::TscSource`] provides samples from the STM32 Touch Sensing
//! Controller.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod benchmark;
pub mod channel;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod filter;
pub mod proximity;
pub mod sensor;
pub mod sleep;
pub mod source;
pub mod tsc;

pub use channel::{ChannelId, ChannelMask, DataKind};
pub use config::{
    BenchmarkFilter, Calibration, ChannelConfig, DenoisePolicy, FilterMode, Polarity, TouchConfig,
    DEFAULT_TOUCH_CONFIG,
};
pub use detector::{DetectorState, Transition};
pub use error::{Error, Result};
pub use event::{EventMask, TouchEvent};
pub use sensor::{ChannelSelect, TouchSensor};
pub use source::{SampleSource, ScanMode};
