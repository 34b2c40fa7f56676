//! Raw sample source port.
//!
//! Everything that touches measurement hardware sits behind [`SampleSource`]:
//! the pipeline only asks which channels have fresh readings and what they are.

use crate::channel::{ChannelId, ChannelMask};

/// How scans are paced
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    /// The source re-triggers scans on its own timer
    Continuous,
    /// Each scan is requested explicitly with a trigger
    OneShot,
}

/// Producer of one raw capacitance reading per scheduled channel per scan
pub trait SampleSource {
    /// Latest reading for `channel`
    fn read_raw(&mut self, channel: ChannelId) -> u32;

    /// Channels with a new reading since the last call.
    ///
    /// Returns an empty mask while a scan is still in progress.
    fn scan_complete(&mut self) -> ChannelMask;

    fn start_continuous_scan(&mut self);

    fn trigger_one_shot_scan(&mut self);

    fn stop_scan(&mut self);
}

impl<T: SampleSource + ?Sized> SampleSource for &mut T {
    fn read_raw(&mut self, channel: ChannelId) -> u32 {
        (**self).read_raw(channel)
    }

    fn scan_complete(&mut self) -> ChannelMask {
        (**self).scan_complete()
    }

    fn start_continuous_scan(&mut self) {
        (**self).start_continuous_scan()
    }

    fn trigger_one_shot_scan(&mut self) {
        (**self).trigger_one_shot_scan()
    }

    fn stop_scan(&mut self) {
        (**self).stop_scan()
    }
}
