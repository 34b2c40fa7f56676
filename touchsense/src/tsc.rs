//! STM32 Touch Sensing Controller as a raw sample source.
//!
//! The TSC measures one electrode per acquisition group at a time, against a
//! sampling capacitor on another IO of the same group. A scan over several
//! electrodes that share a group is therefore split into sequential
//! acquisition phases, each measuring at most one electrode per group. The
//! phase plan is built once from the channel list; [`TscSource`] then walks it
//! every scan and reports the channel set when the last phase is read.
//!
//! The TSC counts charge transfer cycles, which *drop* when a finger adds
//! capacitance, so pair this source with [`Polarity::Falling`]. A group that
//! hits the max count reports `max_count + 1`; set the pipeline timeout to the
//! max count to discard those readings.
//!
//! The peripheral registers are accessed directly rather than through a HAL
//! singleton. Taking a `RegisterBlock` from the application would tie this
//! crate to the application's PAC version, and there is no way to enforce that
//! they match. Don't touch the TSC registers elsewhere in the application.
//!
//! [`Polarity::Falling`]: crate::config::Polarity::Falling

use crate::error::{Error, Result};

#[cfg(any(feature = "stm32f0x1", feature = "stm32f303"))]
pub use self::hw::{Tsc, TscSource};

/// Number of acquisition groups
pub const GROUPS: usize = 8;
/// Groups the driver reads counts from. Groups 7 and 8 only exist on larger
/// packages and are not supported.
pub const READABLE_GROUPS: u8 = 6;
/// Each group has four IOs and one of them is the sampling capacitor
pub const MAX_PHASES: usize = 3;

/// A TSC IO, encoded as `(group << 4) + io`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    G1Ch1 = (1<<4) + 1,
    G1Ch2 = (1<<4) + 2,
    G1Ch3 = (1<<4) + 3,
    G1Ch4 = (1<<4) + 4,
    G2Ch1 = (2<<4) + 1,
    G2Ch2 = (2<<4) + 2,
    G2Ch3 = (2<<4) + 3,
    G2Ch4 = (2<<4) + 4,
    G3Ch1 = (3<<4) + 1,
    G3Ch2 = (3<<4) + 2,
    G3Ch3 = (3<<4) + 3,
    G3Ch4 = (3<<4) + 4,
    G4Ch1 = (4<<4) + 1,
    G4Ch2 = (4<<4) + 2,
    G4Ch3 = (4<<4) + 3,
    G4Ch4 = (4<<4) + 4,
    G5Ch1 = (5<<4) + 1,
    G5Ch2 = (5<<4) + 2,
    G5Ch3 = (5<<4) + 3,
    G5Ch4 = (5<<4) + 4,
    G6Ch1 = (6<<4) + 1,
    G6Ch2 = (6<<4) + 2,
    G6Ch3 = (6<<4) + 3,
    G6Ch4 = (6<<4) + 4,
    G7Ch1 = (7<<4) + 1,
    G7Ch2 = (7<<4) + 2,
    G7Ch3 = (7<<4) + 3,
    G7Ch4 = (7<<4) + 4,
    G8Ch1 = (8<<4) + 1,
    G8Ch2 = (8<<4) + 2,
    G8Ch3 = (8<<4) + 3,
    G8Ch4 = (8<<4) + 4,
}

impl Channel {
    /// Acquisition group, starting at 1
    pub const fn group(self) -> u8 {
        (self as u8) >> 4
    }

    /// IO within the group, starting at 1
    pub const fn io(self) -> u8 {
        (self as u8) & 0xf
    }
}

/// A sense electrode and the sampling capacitor IO of its group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TscChannel {
    pub sense: Channel,
    pub sample: Channel,
}

/// IO configuration for one acquisition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleConfig {
    // Per group: bit 7 set when the group is enabled, bits 6:4 hold the IO used
    // as the sample cap, bits 3:0 the IOs enabled for measurement.
    pub groups: [u8; GROUPS],
}

impl SampleConfig {
    /// Create a new sample config with no groups enabled
    pub const fn new() -> Self {
        Self {
            groups: [0; GROUPS],
        }
    }

    pub fn is_enabled(&self, group: u8) -> bool {
        self.groups[group as usize - 1] & 0x80 != 0
    }

    pub fn sample_io(&self, group: u8) -> u8 {
        (self.groups[group as usize - 1] >> 4) & 0x7
    }

    pub fn channel_mask(&self, group: u8) -> u8 {
        self.groups[group as usize - 1] & 0xf
    }

    /// Enable `ch.sense` for measurement against `ch.sample`.
    ///
    /// Returns false if the group is already measuring an electrode.
    fn measure(&mut self, ch: TscChannel) -> bool {
        let group = ch.sense.group();
        if self.is_enabled(group) {
            return false;
        }
        self.groups[group as usize - 1] = 0x80 | (ch.sample.io() << 4) | (1 << (ch.sense.io() - 1));
        true
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One acquisition of a scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Phase {
    pub config: SampleConfig,
    /// Index of the channel each group measures in this phase
    pub members: [Option<u8>; GROUPS],
}

impl Phase {
    const fn new() -> Self {
        Self {
            config: SampleConfig::new(),
            members: [None; GROUPS],
        }
    }
}

/// The sequence of acquisitions needed to measure every channel once
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanPlan {
    phases: [Phase; MAX_PHASES],
    len: usize,
}

impl ScanPlan {
    /// Assign each channel to the first phase where its group is free
    pub fn new(channels: &[TscChannel]) -> Result<Self> {
        if channels.len() > 32 {
            return Err(Error::InvalidConfiguration);
        }
        let mut plan = Self {
            phases: [Phase::new(); MAX_PHASES],
            len: 0,
        };

        for (index, ch) in channels.iter().enumerate() {
            if ch.sense.group() != ch.sample.group()
                || ch.sense == ch.sample
                || ch.sense.group() > READABLE_GROUPS
            {
                return Err(Error::InvalidConfiguration);
            }
            let group = ch.sense.group() as usize;
            let phase = plan
                .phases
                .iter_mut()
                .position(|phase| phase.config.measure(*ch))
                .ok_or(Error::InvalidConfiguration)?;
            plan.phases[phase].members[group - 1] = Some(index as u8);
            plan.len = plan.len.max(phase + 1);
        }
        Ok(plan)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases[..self.len]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub clock_prescale: Option<ClockPrescaler>,
    pub max_count: Option<MaxCount>,
    pub charge_transfer_high: Option<ChargeDischargeTime>,
    pub charge_transfer_low: Option<ChargeDischargeTime>,
}

#[derive(Clone, Copy, Debug)]
pub enum ClockPrescaler {
    Hclk = 0b000,
    HclkDiv2 = 0b001,
    HclkDiv4 = 0b010,
    HclkDiv8 = 0b011,
    HclkDiv16 = 0b100,
    HclkDiv32 = 0b101,
    HclkDiv64 = 0b110,
    HclkDiv128 = 0b111,
}

/// How many TSC clock cycles are spent charging / discharging
#[derive(Clone, Copy, Debug)]
pub enum ChargeDischargeTime {
    C1 = 0b0000,
    C2 = 0b0001,
    C3 = 0b0010,
    C4 = 0b0011,
    C5 = 0b0100,
    C6 = 0b0101,
    C7 = 0b0110,
    C8 = 0b0111,
    C9 = 0b1000,
    C10 = 0b1001,
    C11 = 0b1010,
    C12 = 0b1011,
    C13 = 0b1100,
    C14 = 0b1101,
    C15 = 0b1110,
    C16 = 0b1111,
}

/// Charge transfer count at which an acquisition gives up
#[derive(Clone, Copy, Debug)]
pub enum MaxCount {
    U255 = 0b000,
    U511 = 0b001,
    U1023 = 0b010,
    U2047 = 0b011,
    U4095 = 0b100,
    U8191 = 0b101,
    U16383 = 0b110,
}

impl MaxCount {
    pub fn to_count(&self) -> u16 {
        (256u32 << (*self as u32)) as u16 - 1
    }
}

#[cfg(any(feature = "stm32f0x1", feature = "stm32f303"))]
mod hw {
    #[cfg(feature = "stm32f0x1")]
    use stm32f0::stm32f0x1 as pac;
    #[cfg(feature = "stm32f303")]
    use stm32f3::stm32f303 as pac;

    use super::{ChargeDischargeTime, ClockPrescaler, Config, MaxCount, ScanPlan, TscChannel};
    use crate::channel::{ChannelId, ChannelMask};
    use crate::error::Result;
    use crate::source::SampleSource;

    const DEFAULT_CTPH: ChargeDischargeTime = ChargeDischargeTime::C2;
    const DEFAULT_CTPL: ChargeDischargeTime = ChargeDischargeTime::C2;
    const DEFAULT_PRESCALE: ClockPrescaler = ClockPrescaler::HclkDiv16;
    const DEFAULT_MAX_COUNT: MaxCount = MaxCount::U8191;

    pub struct Tsc {
        tsc: &'static pac::tsc::RegisterBlock,
        max_count: u16,
    }

    impl Tsc {
        pub fn new(config: Option<Config>) -> Self {
            // Clock and reset the peripheral
            let rcc = unsafe { &*pac::RCC::ptr() };
            rcc.ahbenr.modify(|_, w| w.tscen().set_bit());
            rcc.ahbrstr.modify(|_, w| w.tscrst().set_bit());
            rcc.ahbrstr.modify(|_, w| w.tscrst().clear_bit());

            let config = config.unwrap_or(Config {
                clock_prescale: None,
                max_count: None,
                charge_transfer_high: None,
                charge_transfer_low: None,
            });
            let max_count = config.max_count.unwrap_or(DEFAULT_MAX_COUNT);
            let tsc = unsafe { &*pac::TSC::ptr() };

            tsc.cr.write(|w| unsafe {
                w.ctph().bits(config.charge_transfer_high.unwrap_or(DEFAULT_CTPH) as u8)
                .ctpl().bits(config.charge_transfer_low.unwrap_or(DEFAULT_CTPL) as u8)
                .sse().set_bit()
                .ssd().bits(16)
                .pgpsc().bits(config.clock_prescale.unwrap_or(DEFAULT_PRESCALE) as u8)
                .mcv().bits(max_count as u8)
                .tsce().set_bit()
            });

            Self {
                tsc,
                max_count: max_count.to_count(),
            }
        }

        pub fn max_count(&self) -> u16 {
            self.max_count
        }

        /// Program the IOs for one acquisition and start it
        pub fn start(&mut self, sample_config: &super::SampleConfig) {
            let mut iogcsr: u32 = 0;
            let mut ioscr: u32 = 0;
            let mut ioccr: u32 = 0;

            for group in 1..=super::GROUPS as u8 {
                if !sample_config.is_enabled(group) {
                    continue;
                }
                let shift = (group as u32 - 1) * 4;
                iogcsr |= 1 << (group - 1);
                ioscr |= 1 << (shift + sample_config.sample_io(group) as u32 - 1);
                ioccr |= (sample_config.channel_mask(group) as u32) << shift;
            }

            self.tsc.iogcsr.write(|w| unsafe { w.bits(iogcsr) });
            self.tsc.ioscr.write(|w| unsafe { w.bits(ioscr) });
            self.tsc.ioccr.write(|w| unsafe { w.bits(ioccr) });

            self.clear_flags();
            self.tsc.cr.modify(|_, w| w.iodef().clear_bit());
            self.tsc.cr.modify(|_, w| w.start().set_bit());
        }

        /// True once the acquisition ended, normally or on max count
        pub fn is_finished(&self) -> bool {
            let isr = self.tsc.isr.read();
            isr.eoaf().bit_is_set() || isr.mcef().bit_is_set()
        }

        /// Count for one group (starting at 1) from the last acquisition.
        ///
        /// A group that did not complete before max count reads `max_count + 1`.
        pub fn read_group(&self, group: u8) -> u16 {
            let group_status = self.tsc.iogcsr.read().bits() >> 16;

            if group_status & (1 << (group - 1)) == 0 {
                self.max_count + 1
            } else {
                match group {
                    1 => self.tsc.iog1cr.read().cnt().bits(),
                    2 => self.tsc.iog2cr.read().cnt().bits(),
                    3 => self.tsc.iog3cr.read().cnt().bits(),
                    4 => self.tsc.iog4cr.read().cnt().bits(),
                    5 => self.tsc.iog5cr.read().cnt().bits(),
                    6 => self.tsc.iog6cr.read().cnt().bits(),
                    _ => self.max_count + 1,
                }
            }
        }

        pub fn clear_flags(&mut self) {
            self.tsc.icr.write(|w| {
                w.eoaic().set_bit() // end-of-acquisition
                .mceic().set_bit() // max-count-error
            });
        }

        /// Enable the end-of-acquisition and max count interrupts
        pub fn listen(&mut self) {
            self.tsc.ier.write(|w| {
                w.eoaie().set_bit()
                .mceie().set_bit()
            });
        }

        pub fn unlisten(&mut self) {
            self.tsc.ier.write(|w| {
                w.eoaie().clear_bit()
                .mceie().clear_bit()
            });
        }
    }

    /// [`SampleSource`] measuring `N` electrodes through the TSC
    ///
    /// Channel id `n` is the `n`th entry of the channel list given to `new`.
    /// `scan_complete` drives the phase sequence, so call it from the TSC
    /// interrupt or poll it from the main loop.
    pub struct TscSource<const N: usize> {
        tsc: Tsc,
        plan: ScanPlan,
        readings: [u32; N],
        phase: Option<usize>,
        continuous: bool,
    }

    impl<const N: usize> TscSource<N> {
        pub fn new(tsc: Tsc, channels: [TscChannel; N]) -> Result<Self> {
            let plan = ScanPlan::new(&channels)?;
            let idle = tsc.max_count() as u32 + 1;
            Ok(Self {
                tsc,
                plan,
                readings: [idle; N],
                phase: None,
                continuous: false,
            })
        }

        pub fn tsc(&mut self) -> &mut Tsc {
            &mut self.tsc
        }

        fn start_phase(&mut self, phase: usize) {
            self.phase = Some(phase);
            self.tsc.start(&self.plan.phases()[phase].config);
        }
    }

    impl<const N: usize> SampleSource for TscSource<N> {
        fn read_raw(&mut self, channel: ChannelId) -> u32 {
            self.readings
                .get(channel as usize)
                .copied()
                .unwrap_or(self.tsc.max_count() as u32 + 1)
        }

        fn scan_complete(&mut self) -> ChannelMask {
            let phase = match self.phase {
                Some(phase) if self.tsc.is_finished() => phase,
                _ => return ChannelMask::NONE,
            };

            let members = self.plan.phases()[phase].members;
            for (group, member) in members.iter().enumerate() {
                if let Some(index) = member {
                    self.readings[*index as usize] = self.tsc.read_group(group as u8 + 1) as u32;
                }
            }
            self.tsc.clear_flags();

            if phase + 1 < self.plan.phases().len() {
                self.start_phase(phase + 1);
                return ChannelMask::NONE;
            }

            self.phase = None;
            if self.continuous {
                self.start_phase(0);
            }
            ChannelMask::first(N)
        }

        fn start_continuous_scan(&mut self) {
            self.continuous = true;
            if self.phase.is_none() {
                self.start_phase(0);
            }
        }

        fn trigger_one_shot_scan(&mut self) {
            if self.phase.is_none() {
                self.start_phase(0);
            }
        }

        fn stop_scan(&mut self) {
            self.continuous = false;
            self.phase = None;
            self.tsc.clear_flags();
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    const fn ch(sense: Channel, sample: Channel) -> TscChannel {
        TscChannel { sense, sample }
    }

    #[test]
    fn test_sample_config_encoding() {
        let mut config = SampleConfig::new();
        assert!(config.measure(ch(Channel::G3Ch2, Channel::G3Ch4)));
        assert_eq!(config.groups[2], 0x80 | (4 << 4) | 0b0010);
        assert!(config.is_enabled(3));
        assert_eq!(config.sample_io(3), 4);
        assert_eq!(config.channel_mask(3), 0b0010);
        // Group 3 is now busy
        assert!(!config.measure(ch(Channel::G3Ch3, Channel::G3Ch4)));
        assert!(!config.is_enabled(1));
    }

    #[test]
    fn test_plan_separate_groups_single_phase() {
        let plan = ScanPlan::new(&[
            ch(Channel::G1Ch1, Channel::G1Ch2),
            ch(Channel::G2Ch1, Channel::G2Ch3),
            ch(Channel::G6Ch1, Channel::G6Ch2),
        ])
        .unwrap();
        assert_eq!(plan.phases().len(), 1);
        let members = plan.phases()[0].members;
        assert_eq!(members[0], Some(0));
        assert_eq!(members[1], Some(1));
        assert_eq!(members[5], Some(2));
    }

    #[test]
    fn test_plan_shared_group_splits_phases() {
        let plan = ScanPlan::new(&[
            ch(Channel::G6Ch1, Channel::G6Ch2),
            ch(Channel::G2Ch1, Channel::G2Ch3),
            ch(Channel::G6Ch3, Channel::G6Ch2),
            ch(Channel::G2Ch2, Channel::G2Ch3),
            ch(Channel::G6Ch4, Channel::G6Ch2),
        ])
        .unwrap();
        assert_eq!(plan.phases().len(), 3);
        assert_eq!(plan.phases()[0].members[5], Some(0));
        assert_eq!(plan.phases()[0].members[1], Some(1));
        assert_eq!(plan.phases()[1].members[5], Some(2));
        assert_eq!(plan.phases()[1].members[1], Some(3));
        assert_eq!(plan.phases()[2].members[5], Some(4));
        assert_eq!(plan.phases()[2].members[1], None);
    }

    #[test]
    fn test_plan_rejects_bad_channels() {
        assert_eq!(
            ScanPlan::new(&[ch(Channel::G1Ch1, Channel::G2Ch1)]),
            Err(Error::InvalidConfiguration)
        );
        assert_eq!(
            ScanPlan::new(&[ch(Channel::G1Ch1, Channel::G1Ch1)]),
            Err(Error::InvalidConfiguration)
        );
        assert_eq!(
            ScanPlan::new(&[ch(Channel::G7Ch1, Channel::G7Ch2)]),
            Err(Error::InvalidConfiguration)
        );
        assert_eq!(
            ScanPlan::new(&[
                ch(Channel::G1Ch1, Channel::G1Ch2),
                ch(Channel::G8Ch3, Channel::G8Ch4),
            ]),
            Err(Error::InvalidConfiguration)
        );
        // Four electrodes can't share a group with a sample cap
        assert_eq!(
            ScanPlan::new(&[
                ch(Channel::G1Ch1, Channel::G1Ch4),
                ch(Channel::G1Ch2, Channel::G1Ch4),
                ch(Channel::G1Ch3, Channel::G1Ch4),
                ch(Channel::G1Ch3, Channel::G1Ch4),
            ]),
            Err(Error::InvalidConfiguration)
        );
    }

    #[test]
    fn test_max_count() {
        assert_eq!(MaxCount::U255.to_count(), 255);
        assert_eq!(MaxCount::U8191.to_count(), 8191);
        assert_eq!(MaxCount::U16383.to_count(), 16383);
    }
}
