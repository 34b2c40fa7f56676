//! The scan scheduler.
//!
//! [`TouchSensor`] owns the sample source and every channel's pipeline state.
//! Each scan-complete notification runs the pipeline synchronously for every
//! channel with a new sample; nothing else mutates channel state while a scan
//! session is running except benchmark resets. Configuration changes require
//! the session to be stopped first.

use crate::channel::{ChannelId, ChannelMask, ChannelState, DataKind};
use crate::config::{BenchmarkFilter, ChannelConfig, DenoisePolicy, FilterMode, TouchConfig, DENOISE_LEVELS};
use crate::detector::Transition;
use crate::error::{Error, Result};
use crate::event::{EventMask, EventQueue, TouchEvent};
use crate::proximity::{ProximityAccumulator, MAX_PROXIMITY_CHANNELS};
use crate::sleep::SleepChannel;
use crate::source::{SampleSource, ScanMode};

/// Target of a benchmark reset
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelSelect {
    One(ChannelId),
    /// Every enabled channel
    All,
}

#[derive(Clone, Copy, Debug)]
struct ProximitySlot {
    channel: ChannelId,
    accumulator: ProximityAccumulator,
}

pub struct TouchSensor<S, const N: usize> {
    source: S,
    config: TouchConfig,
    channels: [ChannelState; N],
    proximity: [Option<ProximitySlot>; MAX_PROXIMITY_CHANNELS],
    sleep: Option<SleepChannel>,
    guard: Option<ChannelId>,
    wake_reason: Option<ChannelId>,
    scan: Option<ScanMode>,
    events: EventQueue,
    event_mask: EventMask,
}

impl<S: SampleSource, const N: usize> TouchSensor<S, N> {
    // Active and sample sets are u32 bitsets
    const CHANNEL_LIMIT: () = assert!(N <= 32, "a TouchSensor supports at most 32 channels");

    /// Create a sensor with all channels disabled and scanning stopped
    pub fn new(source: S, config: TouchConfig) -> Result<Self> {
        #[allow(clippy::let_unit_value)]
        let () = Self::CHANNEL_LIMIT;
        config.validate()?;

        Ok(Self {
            source,
            config,
            channels: [ChannelState::new(&config); N],
            proximity: [None; MAX_PROXIMITY_CHANNELS],
            sleep: None,
            guard: None,
            wake_reason: None,
            scan: None,
            events: EventQueue::new(),
            event_mask: EventMask::default(),
        })
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Release the sample source
    pub fn into_source(self) -> S {
        self.source
    }

    fn index(&self, channel: ChannelId) -> Result<usize> {
        let index = channel as usize;
        if index < N {
            Ok(index)
        } else {
            Err(Error::InvalidChannel(channel))
        }
    }

    fn enabled_index(&self, channel: ChannelId) -> Result<usize> {
        let index = self.index(channel)?;
        if self.channels[index].enabled {
            Ok(index)
        } else {
            Err(Error::InvalidChannel(channel))
        }
    }

    fn ensure_stopped(&self) -> Result<()> {
        match self.scan {
            None => Ok(()),
            Some(_) => Err(Error::NotInState),
        }
    }

    fn slot_mut(&mut self, channel: ChannelId) -> Option<&mut ProximitySlot> {
        self.proximity
            .iter_mut()
            .flatten()
            .find(|slot| slot.channel == channel)
    }

    fn emit(&mut self, event: TouchEvent) {
        if !self.event_mask.allows(&event) {
            return;
        }
        if let Some(dropped) = self.events.push(event) {
            warn!("touch event queue full, dropped {:?}", dropped);
        }
    }

    /* Configuration */

    /// Set the detection parameters of one channel
    pub fn configure_channel(
        &mut self,
        channel: ChannelId,
        threshold: u32,
        hysteresis: u32,
        debounce: u8,
    ) -> Result<()> {
        self.ensure_stopped()?;
        let index = self.index(channel)?;
        let config = ChannelConfig::new(threshold, hysteresis, debounce);
        config.validate()?;
        self.channels[index].config = config;
        debug!(
            "touch ch{} threshold {} hysteresis {} debounce {}",
            channel,
            threshold,
            hysteresis,
            debounce
        );
        Ok(())
    }

    pub fn set_filter_mode(&mut self, mode: FilterMode) -> Result<()> {
        self.ensure_stopped()?;
        mode.validate()?;
        self.config.filter_mode = mode;
        Ok(())
    }

    pub fn set_benchmark_filter(&mut self, filter: BenchmarkFilter) -> Result<()> {
        self.ensure_stopped()?;
        self.config.benchmark_filter = filter;
        Ok(())
    }

    /// Select the denoise level; 0 lets every sample update the benchmark
    pub fn set_denoise_level(&mut self, level: u8) -> Result<()> {
        self.ensure_stopped()?;
        if level as usize >= DENOISE_LEVELS {
            return Err(Error::InvalidConfiguration);
        }
        self.config.denoise_level = level;
        Ok(())
    }

    /// Replace the level-to-window table used by the denoise policy
    pub fn set_denoise_table(&mut self, policy: DenoisePolicy) -> Result<()> {
        self.ensure_stopped()?;
        self.config.denoise = policy;
        Ok(())
    }

    /// Select which event kinds are queued. May be changed at any time.
    pub fn set_event_mask(&mut self, mask: EventMask) {
        self.event_mask = mask;
    }

    pub fn event_mask(&self) -> EventMask {
        self.event_mask
    }

    /// Enable a channel for scanning. Its benchmark is acquired from the next samples.
    pub fn enable_channel(&mut self, channel: ChannelId) -> Result<()> {
        self.ensure_stopped()?;
        let index = self.index(channel)?;
        let ch = &mut self.channels[index];
        ch.restart(&self.config);
        ch.enabled = true;
        if let Some(slot) = self.slot_mut(channel) {
            slot.accumulator.reset();
        }
        debug!("touch ch{} enabled", channel);
        Ok(())
    }

    /// Disable a channel. Its pipeline state is discarded.
    pub fn disable_channel(&mut self, channel: ChannelId) -> Result<()> {
        self.ensure_stopped()?;
        let index = self.index(channel)?;
        let ch = &mut self.channels[index];
        ch.restart(&self.config);
        ch.enabled = false;
        if let Some(slot) = self.slot_mut(channel) {
            slot.accumulator.reset();
        }
        debug!("touch ch{} disabled", channel);
        Ok(())
    }

    /// Snap benchmarks to the latest raw sample, bypassing denoise.
    ///
    /// Allowed while scanning. A channel that has not been sampled yet takes
    /// its benchmark from its next sample.
    pub fn reset_benchmark(&mut self, select: ChannelSelect) -> Result<()> {
        match select {
            ChannelSelect::One(channel) => {
                let index = self.enabled_index(channel)?;
                self.channels[index].reset_benchmark();
                debug!("touch ch{} benchmark reset", channel);
            }
            ChannelSelect::All => {
                for ch in self.channels.iter_mut().filter(|ch| ch.enabled) {
                    ch.reset_benchmark();
                }
                debug!("touch benchmarks reset");
            }
        }
        Ok(())
    }

    /// Designate a channel for proximity sensing.
    ///
    /// Every `total_cycles` scans a decision is made: detected if at least
    /// `detect_fraction` of those scans found the channel active.
    pub fn configure_proximity(
        &mut self,
        channel: ChannelId,
        total_cycles: u32,
        detect_fraction: f32,
    ) -> Result<()> {
        self.ensure_stopped()?;
        self.index(channel)?;
        let accumulator = ProximityAccumulator::new(total_cycles, detect_fraction)?;

        if let Some(slot) = self.slot_mut(channel) {
            slot.accumulator = accumulator;
            return Ok(());
        }
        let free = self
            .proximity
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(Error::InvalidConfiguration)?;
        *free = Some(ProximitySlot {
            channel,
            accumulator,
        });
        debug!("touch ch{} proximity over {} cycles", channel, total_cycles);
        Ok(())
    }

    /// Remove a channel's proximity designation
    pub fn clear_proximity(&mut self, channel: ChannelId) -> Result<()> {
        self.ensure_stopped()?;
        let slot = self
            .proximity
            .iter_mut()
            .find(|slot| matches!(slot, Some(s) if s.channel == channel))
            .ok_or(Error::InvalidChannel(channel))?;
        *slot = None;
        if let Some(sleep) = self.sleep.as_mut() {
            if sleep.channel == channel {
                sleep.proximity = false;
            }
        }
        Ok(())
    }

    /// Designate the channel monitored during sleep.
    ///
    /// Proximity sleep sensing needs the channel to be configured for
    /// proximity first.
    pub fn configure_sleep_channel(
        &mut self,
        channel: ChannelId,
        threshold: u32,
        proximity_enabled: bool,
    ) -> Result<()> {
        self.ensure_stopped()?;
        if self.is_sleeping() {
            return Err(Error::NotInState);
        }
        self.index(channel)?;
        if proximity_enabled && self.slot_mut(channel).is_none() {
            return Err(Error::InvalidConfiguration);
        }
        self.sleep = Some(SleepChannel::new(channel, threshold, proximity_enabled));
        Ok(())
    }

    /// Designate a guard channel, or remove the designation with `None`.
    ///
    /// While the guard channel is active, activation of every other channel
    /// is held off: channels that are not already active stay `Inactive`.
    /// Active channels can still release. Samples are processed in channel
    /// order, so a channel numbered below the guard sees the guard state of
    /// the previous scan.
    pub fn set_guard_channel(&mut self, guard: Option<ChannelId>) -> Result<()> {
        self.ensure_stopped()?;
        if let Some(channel) = guard {
            self.index(channel)?;
            debug!("touch ch{} is the guard", channel);
        }
        self.guard = guard;
        Ok(())
    }

    pub fn guard_channel(&self) -> Option<ChannelId> {
        self.guard
    }

    /* Scan control */

    /// Begin a scan session
    pub fn start(&mut self, mode: ScanMode) -> Result<()> {
        if self.scan.is_some() {
            return Err(Error::NotInState);
        }
        if mode == ScanMode::Continuous {
            self.source.start_continuous_scan();
        }
        self.scan = Some(mode);
        debug!("touch scan started {:?}", mode);
        Ok(())
    }

    /// Request one scan in a one-shot session
    pub fn trigger(&mut self) -> Result<()> {
        if self.scan != Some(ScanMode::OneShot) {
            return Err(Error::NotInState);
        }
        self.source.trigger_one_shot_scan();
        Ok(())
    }

    /// End the scan session. Channel state is left as it is.
    pub fn stop(&mut self) {
        self.source.stop_scan();
        self.scan = None;
    }

    pub fn scan_mode(&self) -> Option<ScanMode> {
        self.scan
    }

    /// Handle a scan-complete notification from the source.
    ///
    /// Runs the pipeline for every channel with a new sample and returns the
    /// set of channels processed. While sleeping only the sleep channel is
    /// processed. Notifications outside a scan session are ignored.
    pub fn on_scan_complete(&mut self) -> ChannelMask {
        if self.scan.is_none() {
            return ChannelMask::NONE;
        }
        let fresh = self.source.scan_complete();
        let mut processed = ChannelMask::NONE;

        for channel in fresh.iter().filter(|&ch| (ch as usize) < N) {
            let wanted = match &self.sleep {
                Some(sleep) if sleep.sleeping() => sleep.channel == channel,
                _ => self.channels[channel as usize].enabled,
            };
            if !wanted {
                continue;
            }
            let raw = self.source.read_raw(channel);
            // Channel was validated above, this cannot fail
            let _ = self.process_sample(channel, raw);
            processed.insert(channel);
        }

        if !processed.is_empty() {
            self.emit(TouchEvent::ScanDone);
        }
        processed
    }

    /// Run one raw sample through a channel's pipeline.
    ///
    /// This is what the scan loop does for each fresh sample; it is public so
    /// samples can also be pushed directly. Returns the transition committed
    /// on this cycle.
    pub fn process_sample(&mut self, channel: ChannelId, raw: u32) -> Result<Option<Transition>> {
        if self.is_sleeping() {
            let sleep_channel = self.sleep.as_ref().map(|sleep| sleep.channel);
            return if sleep_channel == Some(channel) {
                Ok(self.sleep_step(channel, raw))
            } else {
                Err(Error::InvalidChannel(channel))
            };
        }
        let index = self.enabled_index(channel)?;

        if self.timed_out(channel, raw) {
            // The cycle still happened; it counts as an inactive proximity cycle
            self.count_proximity_cycle(channel, false);
            return Ok(None);
        }

        let outcome = if self.guard_holds_off(channel) {
            self.channels[index].process_held_off(raw, &self.config)
        } else {
            self.channels[index].process(raw, &self.config)
        };
        self.emit(TouchEvent::Done(channel));
        self.emit_transition(channel, outcome.transition);
        self.count_proximity_cycle(channel, outcome.active);

        Ok(outcome.transition)
    }

    fn count_proximity_cycle(&mut self, channel: ChannelId, active: bool) {
        let decision = self
            .slot_mut(channel)
            .and_then(|slot| slot.accumulator.on_cycle(active));
        if let Some(detected) = decision {
            trace!("touch ch{} proximity {}", channel, detected);
            self.emit(TouchEvent::ProximityDone { channel, detected });
        }
    }

    /// The guard channel is active and `channel` is not the guard
    fn guard_holds_off(&self, channel: ChannelId) -> bool {
        match self.guard {
            Some(guard) if guard != channel => self
                .channels
                .get(guard as usize)
                .map_or(false, |ch| ch.enabled && ch.active()),
            _ => false,
        }
    }

    fn timed_out(&mut self, channel: ChannelId, raw: u32) -> bool {
        match self.config.timeout {
            Some(limit) if raw > limit => {
                warn!("touch ch{} measurement timeout ({})", channel, raw);
                self.emit(TouchEvent::Timeout(channel));
                true
            }
            _ => false,
        }
    }

    fn emit_transition(&mut self, channel: ChannelId, transition: Option<Transition>) {
        match transition {
            Some(Transition::Activated) => {
                trace!("touch ch{} active", channel);
                self.emit(TouchEvent::Active(channel));
            }
            Some(Transition::Deactivated) => {
                trace!("touch ch{} inactive", channel);
                self.emit(TouchEvent::Inactive(channel));
            }
            None => {}
        }
    }

    fn sleep_step(&mut self, channel: ChannelId, raw: u32) -> Option<Transition> {
        let sleep = self.sleep.as_mut()?;
        let outcome = match self.config.timeout {
            Some(limit) if raw > limit => {
                let outcome = sleep.skip_cycle()?;
                warn!("touch ch{} measurement timeout ({})", channel, raw);
                self.emit(TouchEvent::Timeout(channel));
                outcome
            }
            _ => {
                let outcome = sleep.process(raw, &self.config)?;
                self.emit(TouchEvent::Done(channel));
                self.emit_transition(channel, outcome.cycle.transition);
                outcome
            }
        };

        if let Some(detected) = outcome.proximity {
            self.emit(TouchEvent::ProximityDone { channel, detected });
        }
        if outcome.wake && self.wake_reason.is_none() {
            info!("touch wake from ch{}", channel);
            self.wake_reason = Some(channel);
        }
        outcome.cycle.transition
    }

    /* Power state */

    /// Switch to low-power monitoring of the sleep channel only
    pub fn enter_sleep(&mut self) -> Result<()> {
        let channel = match &self.sleep {
            Some(sleep) if !sleep.sleeping() => sleep.channel,
            _ => return Err(Error::NotInState),
        };
        let index = self.enabled_index(channel)?;
        let awake = self.channels[index];
        let accumulator = self.slot_mut(channel).map(|slot| slot.accumulator);

        self.wake_reason = None;
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.enter(&awake, accumulator);
        }
        info!("touch sleeping, wake channel ch{}", channel);
        Ok(())
    }

    /// Return to scanning all enabled channels
    pub fn exit_sleep(&mut self) -> Result<()> {
        match self.sleep.as_mut() {
            Some(sleep) if sleep.sleeping() => {
                sleep.exit();
                info!("touch awake");
                Ok(())
            }
            _ => Err(Error::NotInState),
        }
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep.as_ref().map_or(false, |sleep| sleep.sleeping())
    }

    /// Snap the sleep channel's benchmark to its latest sample
    pub fn reset_sleep_benchmark(&mut self) -> Result<()> {
        match self.sleep.as_mut() {
            Some(sleep) if sleep.sleeping() => {
                sleep.reset_benchmark();
                Ok(())
            }
            _ => Err(Error::NotInState),
        }
    }

    pub fn sleep_channel(&self) -> Option<&SleepChannel> {
        self.sleep.as_ref()
    }

    /// Channel whose activation ended the last sleep, if any
    pub fn get_wake_reason(&self) -> Option<ChannelId> {
        self.wake_reason
    }

    /* Results */

    /// Set of channels currently considered active
    pub fn poll_active_mask(&self) -> ChannelMask {
        let mut mask = ChannelMask::NONE;
        if let Some(sleep) = self.sleep.as_ref() {
            if let Some(state) = sleep.state() {
                if state.active() {
                    mask.insert(sleep.channel);
                }
                return mask;
            }
        }
        for (id, ch) in self.channels.iter().enumerate() {
            if ch.enabled && ch.active() {
                mask.insert(id as ChannelId);
            }
        }
        mask
    }

    /// Take the decision of the last completed proximity window on `channel`.
    ///
    /// `Ok(None)` means no window has completed since the last poll.
    pub fn poll_proximity_result(&mut self, channel: ChannelId) -> Result<Option<bool>> {
        self.index(channel)?;
        let slot = self
            .slot_mut(channel)
            .ok_or(Error::InvalidChannel(channel))?;
        Ok(slot.accumulator.take_result())
    }

    /// Progress of the current proximity window as `(active cycles, cycles)`
    pub fn proximity_progress(&mut self, channel: ChannelId) -> Result<(u32, u32)> {
        let slot = self
            .slot_mut(channel)
            .ok_or(Error::InvalidChannel(channel))?;
        Ok((slot.accumulator.accumulator, slot.accumulator.cycles))
    }

    pub fn pop_event(&mut self) -> Option<TouchEvent> {
        self.events.pop()
    }

    /// Read back a pipeline value. `None` until the value exists.
    pub fn read(&self, channel: ChannelId, kind: DataKind) -> Result<Option<u32>> {
        let index = self.index(channel)?;
        Ok(self.channels[index].read(kind))
    }

    pub fn state(&self, channel: ChannelId) -> Result<&ChannelState> {
        let index = self.index(channel)?;
        Ok(&self.channels[index])
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::config::{Polarity, DEFAULT_TOUCH_CONFIG};
    use crate::detector::DetectorState;

    /// Source serving a fixed reading per channel
    pub struct MockSource<const N: usize> {
        pub readings: [u32; N],
        pub pending: ChannelMask,
        pub continuous: bool,
        pub triggers: u32,
        pub stops: u32,
    }

    impl<const N: usize> MockSource<N> {
        pub fn new() -> Self {
            Self {
                readings: [0; N],
                pending: ChannelMask::NONE,
                continuous: false,
                triggers: 0,
                stops: 0,
            }
        }

        /// Make a full scan with these readings available
        pub fn load(&mut self, readings: [u32; N]) {
            self.readings = readings;
            self.pending = ChannelMask::first(N);
        }
    }

    impl<const N: usize> SampleSource for MockSource<N> {
        fn read_raw(&mut self, channel: ChannelId) -> u32 {
            self.readings[channel as usize]
        }

        fn scan_complete(&mut self) -> ChannelMask {
            core::mem::take(&mut self.pending)
        }

        fn start_continuous_scan(&mut self) {
            self.continuous = true;
        }

        fn trigger_one_shot_scan(&mut self) {
            self.triggers += 1;
        }

        fn stop_scan(&mut self) {
            self.continuous = false;
            self.stops += 1;
        }
    }

    fn config() -> TouchConfig {
        let mut config = DEFAULT_TOUCH_CONFIG;
        config.filter_mode = FilterMode::Passthrough;
        config.denoise_level = 3;
        config.channel = ChannelConfig::new(100, 10, 1);
        config
    }

    fn sensor<const N: usize>() -> TouchSensor<MockSource<N>, N> {
        let mut s = TouchSensor::new(MockSource::new(), config()).unwrap();
        for ch in 0..N as u8 {
            s.enable_channel(ch).unwrap();
        }
        s
    }

    fn scan<const N: usize>(s: &mut TouchSensor<MockSource<N>, N>, readings: [u32; N]) -> ChannelMask {
        s.source_mut().load(readings);
        s.on_scan_complete()
    }

    #[test]
    fn test_channel_range() {
        let mut s = sensor::<4>();
        assert_eq!(s.enable_channel(4), Err(Error::InvalidChannel(4)));
        assert_eq!(s.configure_channel(9, 1, 1, 1), Err(Error::InvalidChannel(9)));
        assert_eq!(s.process_sample(4, 0), Err(Error::InvalidChannel(4)));
        assert!(s.read(4, DataKind::Raw).is_err());
    }

    #[test]
    fn test_disabled_channel_rejected() {
        let mut s = sensor::<2>();
        s.disable_channel(1).unwrap();
        assert_eq!(s.process_sample(1, 100), Err(Error::InvalidChannel(1)));
        assert_eq!(
            s.reset_benchmark(ChannelSelect::One(1)),
            Err(Error::InvalidChannel(1))
        );
    }

    #[test]
    fn test_configuration_requires_stopped() {
        let mut s = sensor::<2>();
        s.start(ScanMode::OneShot).unwrap();
        assert_eq!(s.configure_channel(0, 1, 1, 1), Err(Error::NotInState));
        assert_eq!(s.set_filter_mode(FilterMode::Level(2)), Err(Error::NotInState));
        assert_eq!(s.set_denoise_level(2), Err(Error::NotInState));
        assert_eq!(s.enable_channel(1), Err(Error::NotInState));
        assert_eq!(s.configure_proximity(0, 10, 0.5), Err(Error::NotInState));
        // Benchmark reset is allowed mid-session
        assert_eq!(s.reset_benchmark(ChannelSelect::All), Ok(()));
        s.stop();
        assert_eq!(s.configure_channel(0, 1, 1, 1), Ok(()));
    }

    #[test]
    fn test_scan_modes() {
        let mut s = sensor::<2>();
        assert_eq!(s.trigger(), Err(Error::NotInState));

        s.start(ScanMode::Continuous).unwrap();
        assert!(s.source().continuous);
        assert_eq!(s.start(ScanMode::OneShot), Err(Error::NotInState));
        assert_eq!(s.trigger(), Err(Error::NotInState));
        s.stop();
        assert!(!s.source().continuous);

        s.start(ScanMode::OneShot).unwrap();
        s.trigger().unwrap();
        s.trigger().unwrap();
        assert_eq!(s.source().triggers, 2);
        s.stop();
        assert_eq!(s.source().stops, 2);
        assert_eq!(s.scan_mode(), None);
    }

    #[test]
    fn test_scan_processes_enabled_channels() {
        let mut s = sensor::<3>();
        s.disable_channel(1).unwrap();

        // Outside a session nothing is processed
        assert_eq!(scan(&mut s, [1000, 1000, 1000]), ChannelMask::NONE);

        s.start(ScanMode::Continuous).unwrap();
        assert_eq!(scan(&mut s, [1000, 1000, 1000]), ChannelMask(0b101));
        assert_eq!(s.pop_event(), Some(TouchEvent::ScanDone));
        assert_eq!(s.read(1, DataKind::Raw), Ok(None));

        assert_eq!(scan(&mut s, [1200, 1000, 1000]), ChannelMask(0b101));
        assert_eq!(s.poll_active_mask(), ChannelMask(0b001));
        assert_eq!(s.pop_event(), Some(TouchEvent::Active(0)));
        assert_eq!(s.pop_event(), Some(TouchEvent::ScanDone));
        assert_eq!(s.pop_event(), None);

        // No new samples, no events
        assert_eq!(s.on_scan_complete(), ChannelMask::NONE);
        assert_eq!(s.pop_event(), None);
    }

    #[test]
    fn test_stop_leaves_state() {
        let mut s = sensor::<1>();
        s.start(ScanMode::Continuous).unwrap();
        scan(&mut s, [1000]);
        scan(&mut s, [1200]);
        s.stop();
        assert_eq!(s.state(0).unwrap().state(), DetectorState::Active);
        assert_eq!(s.read(0, DataKind::Benchmark), Ok(Some(1000)));
    }

    #[test]
    fn test_event_mask() {
        let mut s = sensor::<1>();
        s.set_event_mask(EventMask::ALL);
        s.process_sample(0, 1000).unwrap();
        assert_eq!(s.pop_event(), Some(TouchEvent::Done(0)));

        let mut mask = EventMask::NONE;
        mask.set_inactive(true);
        s.set_event_mask(mask);
        s.process_sample(0, 1200).unwrap();
        s.process_sample(0, 1000).unwrap();
        assert_eq!(s.pop_event(), Some(TouchEvent::Inactive(0)));
        assert_eq!(s.pop_event(), None);
    }

    #[test]
    fn test_timeout_drops_sample() {
        let mut config = config();
        config.timeout = Some(4000);
        let mut s = TouchSensor::<_, 1>::new(MockSource::<1>::new(), config).unwrap();
        s.enable_channel(0).unwrap();
        s.process_sample(0, 1000).unwrap();

        assert_eq!(s.process_sample(0, 4001), Ok(None));
        assert_eq!(s.pop_event(), Some(TouchEvent::Timeout(0)));
        assert_eq!(s.read(0, DataKind::Raw), Ok(Some(1000)));
        assert_eq!(s.state(0).unwrap().state(), DetectorState::Inactive);
    }

    #[test]
    fn test_reset_benchmark_idempotent() {
        let mut s = sensor::<2>();
        s.set_denoise_level(0).unwrap();
        s.process_sample(0, 1000).unwrap();
        s.set_denoise_level(3).unwrap();
        s.process_sample(0, 1100).unwrap();
        assert_eq!(s.read(0, DataKind::Benchmark), Ok(Some(1000)));

        s.reset_benchmark(ChannelSelect::One(0)).unwrap();
        let first = s.read(0, DataKind::Benchmark).unwrap();
        s.reset_benchmark(ChannelSelect::One(0)).unwrap();
        assert_eq!(s.read(0, DataKind::Benchmark).unwrap(), first);
        assert_eq!(first, Some(1100));
    }

    #[test]
    fn test_proximity_designation() {
        let mut s = sensor::<5>();
        assert_eq!(s.poll_proximity_result(0), Err(Error::InvalidChannel(0)));
        assert_eq!(s.configure_proximity(0, 0, 0.5), Err(Error::InvalidConfiguration));

        for ch in 0..MAX_PROXIMITY_CHANNELS as u8 {
            s.configure_proximity(ch, 4, 0.5).unwrap();
        }
        // Reconfiguring an existing designation doesn't need a free slot
        s.configure_proximity(0, 2, 0.5).unwrap();
        assert_eq!(s.configure_proximity(4, 4, 0.5), Err(Error::InvalidConfiguration));
        s.clear_proximity(2).unwrap();
        s.configure_proximity(4, 4, 0.5).unwrap();
    }

    #[test]
    fn test_proximity_window_through_sensor() {
        let mut s = sensor::<1>();
        s.configure_proximity(0, 4, 0.5).unwrap();
        s.process_sample(0, 1000).unwrap();
        assert_eq!(s.poll_proximity_result(0), Ok(None));
        assert_eq!(s.proximity_progress(0), Ok((0, 1)));

        s.process_sample(0, 1200).unwrap();
        s.process_sample(0, 1200).unwrap();
        s.process_sample(0, 1000).unwrap();
        assert_eq!(s.poll_proximity_result(0), Ok(Some(true)));
        assert_eq!(s.poll_proximity_result(0), Ok(None));
        assert_eq!(s.proximity_progress(0), Ok((0, 0)));

        let events: [Option<TouchEvent>; 3] = [s.pop_event(), s.pop_event(), s.pop_event()];
        assert_eq!(
            events,
            [
                Some(TouchEvent::Active(0)),
                Some(TouchEvent::Inactive(0)),
                Some(TouchEvent::ProximityDone {
                    channel: 0,
                    detected: true
                }),
            ]
        );
    }

    #[test]
    fn test_sleep_cycle() {
        let mut s = sensor::<3>();
        assert_eq!(s.enter_sleep(), Err(Error::NotInState));
        s.configure_sleep_channel(2, 50, false).unwrap();

        s.start(ScanMode::Continuous).unwrap();
        scan(&mut s, [1000, 1000, 1000]);
        s.stop();
        s.enter_sleep().unwrap();
        assert!(s.is_sleeping());
        assert_eq!(s.enter_sleep(), Err(Error::NotInState));
        assert_eq!(s.get_wake_reason(), None);

        s.start(ScanMode::Continuous).unwrap();
        // Only the sleep channel is processed; 1060 is below the awake threshold
        assert_eq!(scan(&mut s, [1500, 1500, 1060]), ChannelMask::single(2));
        assert_eq!(s.get_wake_reason(), Some(2));
        assert_eq!(s.poll_active_mask(), ChannelMask::single(2));
        assert_eq!(s.state(0).unwrap().state(), DetectorState::Inactive);
        assert_eq!(s.process_sample(0, 1500), Err(Error::InvalidChannel(0)));

        s.exit_sleep().unwrap();
        assert!(!s.is_sleeping());
        assert_eq!(s.poll_active_mask(), ChannelMask::NONE);
        // Wake reason survives until the next sleep
        assert_eq!(s.get_wake_reason(), Some(2));
        s.stop();
        s.enter_sleep().unwrap();
        assert_eq!(s.get_wake_reason(), None);
    }

    #[test]
    fn test_sleep_proximity_needs_designation() {
        let mut s = sensor::<2>();
        assert_eq!(
            s.configure_sleep_channel(1, 50, true),
            Err(Error::InvalidConfiguration)
        );
        s.configure_proximity(1, 4, 0.5).unwrap();
        assert_eq!(s.configure_sleep_channel(1, 50, true), Ok(()));
    }

    #[test]
    fn test_sleep_channel_must_be_enabled() {
        let mut s = sensor::<2>();
        s.configure_sleep_channel(1, 50, false).unwrap();
        s.disable_channel(1).unwrap();
        assert_eq!(s.enter_sleep(), Err(Error::InvalidChannel(1)));
    }

    #[test]
    fn test_timeout_counts_as_inactive_proximity_cycle() {
        let mut config = config();
        config.timeout = Some(5000);
        let mut s = TouchSensor::<_, 1>::new(MockSource::<1>::new(), config).unwrap();
        s.enable_channel(0).unwrap();
        s.configure_proximity(0, 4, 0.5).unwrap();
        s.start(ScanMode::Continuous).unwrap();

        scan(&mut s, [1000]);
        scan(&mut s, [6000]);
        assert_eq!(s.proximity_progress(0), Ok((0, 2)));
        scan(&mut s, [6000]);
        scan(&mut s, [1000]);
        assert_eq!(s.poll_proximity_result(0), Ok(Some(false)));
        assert_eq!(s.proximity_progress(0), Ok((0, 0)));
    }

    #[test]
    fn test_sleep_timeout_counts_toward_window() {
        let mut config = config();
        config.timeout = Some(5000);
        let mut s = TouchSensor::<_, 1>::new(MockSource::<1>::new(), config).unwrap();
        s.enable_channel(0).unwrap();
        s.configure_proximity(0, 2, 0.5).unwrap();
        s.configure_sleep_channel(0, 50, true).unwrap();
        s.process_sample(0, 1000).unwrap();
        s.enter_sleep().unwrap();

        s.process_sample(0, 1060).unwrap();
        s.process_sample(0, 6000).unwrap();
        // One active cycle out of two is enough at 0.5
        assert_eq!(s.get_wake_reason(), Some(0));
    }

    #[test]
    fn test_guard_holds_off_other_channels() {
        let mut s = sensor::<3>();
        s.set_guard_channel(Some(0)).unwrap();
        assert_eq!(s.guard_channel(), Some(0));
        assert_eq!(s.set_guard_channel(Some(3)), Err(Error::InvalidChannel(3)));

        s.start(ScanMode::Continuous).unwrap();
        assert_eq!(s.set_guard_channel(None), Err(Error::NotInState));
        scan(&mut s, [1000, 1000, 1000]);

        // Channel 2 activates before the guard does
        scan(&mut s, [1000, 1000, 1200]);
        assert_eq!(s.poll_active_mask(), ChannelMask(0b100));

        // Water over the pads: guard and channel 1 both see signal
        scan(&mut s, [1200, 1200, 1200]);
        assert_eq!(s.poll_active_mask(), ChannelMask(0b101));
        assert_eq!(s.state(1).unwrap().state(), DetectorState::Inactive);

        // Held off channels can still release
        scan(&mut s, [1200, 1200, 1000]);
        assert_eq!(s.poll_active_mask(), ChannelMask(0b001));

        // Guard released, channel 1 is free to activate
        scan(&mut s, [1000, 1200, 1000]);
        assert_eq!(s.poll_active_mask(), ChannelMask(0b010));

        s.stop();
        s.set_guard_channel(None).unwrap();
        s.start(ScanMode::Continuous).unwrap();
        scan(&mut s, [1200, 1200, 1200]);
        assert_eq!(s.poll_active_mask(), ChannelMask(0b111));
    }

    #[test]
    fn test_custom_denoise_table() {
        let mut s = sensor::<1>();
        s.set_denoise_level(1).unwrap();
        s.process_sample(0, 1000).unwrap();
        // Default level 1 window is half the threshold
        s.process_sample(0, 1090).unwrap();
        assert_eq!(s.read(0, DataKind::Benchmark), Ok(Some(1000)));

        s.set_denoise_table(DenoisePolicy {
            eighths: [None, Some(8), Some(8), Some(8), Some(8)],
        })
        .unwrap();
        s.process_sample(0, 1090).unwrap();
        assert_eq!(s.read(0, DataKind::Benchmark), Ok(Some(1090)));

        s.start(ScanMode::OneShot).unwrap();
        assert_eq!(s.set_denoise_table(DenoisePolicy::default()), Err(Error::NotInState));
    }

    #[test]
    fn test_benchmark_filter_through_sensor() {
        let mut s = sensor::<1>();
        s.set_benchmark_filter(BenchmarkFilter::Iir4).unwrap();
        s.process_sample(0, 1000).unwrap();
        s.process_sample(0, 1020).unwrap();
        assert_eq!(s.read(0, DataKind::Benchmark), Ok(Some(1005)));
        s.process_sample(0, 1020).unwrap();
        assert_eq!(s.read(0, DataKind::Benchmark), Ok(Some(1009)));

        s.start(ScanMode::Continuous).unwrap();
        assert_eq!(s.set_benchmark_filter(BenchmarkFilter::Immediate), Err(Error::NotInState));
    }

    #[test]
    fn test_reset_sleep_benchmark() {
        let mut s = sensor::<2>();
        assert_eq!(s.reset_sleep_benchmark(), Err(Error::NotInState));
        s.configure_sleep_channel(1, 50, false).unwrap();
        s.process_sample(1, 1000).unwrap();
        s.enter_sleep().unwrap();

        // Outside the sleep denoise window, below the sleep threshold
        s.process_sample(1, 1040).unwrap();
        let sleep_benchmark = |s: &TouchSensor<MockSource<2>, 2>| {
            s.sleep_channel()
                .and_then(|sleep| sleep.state())
                .and_then(|state| state.read(DataKind::Benchmark))
        };
        assert_eq!(sleep_benchmark(&s), Some(1000));

        s.reset_sleep_benchmark().unwrap();
        assert_eq!(sleep_benchmark(&s), Some(1040));
        // The awake pipeline is untouched
        assert_eq!(s.read(1, DataKind::Benchmark), Ok(Some(1000)));
    }

    #[test]
    fn test_falling_polarity_press_and_release() {
        let mut config = config();
        config.polarity = Polarity::Falling;
        let mut s = TouchSensor::<_, 1>::new(MockSource::<1>::new(), config).unwrap();
        s.configure_channel(0, 100, 10, 2).unwrap();
        s.enable_channel(0).unwrap();
        s.start(ScanMode::Continuous).unwrap();

        let script = [
            (1000, DetectorState::Inactive),
            // A rise is noise for a falling channel
            (1200, DetectorState::Inactive),
            (880, DetectorState::PendingActive(1)),
            (870, DetectorState::Active),
            (1000, DetectorState::PendingInactive(1)),
            (1000, DetectorState::Inactive),
        ];
        for (raw, expected) in script {
            scan(&mut s, [raw]);
            assert_eq!(s.state(0).unwrap().state(), expected);
        }
        assert_eq!(s.read(0, DataKind::Benchmark), Ok(Some(1000)));

        let mut transitions = [None; 2];
        let mut n = 0;
        while let Some(event) = s.pop_event() {
            if event != TouchEvent::ScanDone {
                transitions[n] = Some(event);
                n += 1;
            }
        }
        assert_eq!(
            transitions,
            [Some(TouchEvent::Active(0)), Some(TouchEvent::Inactive(0))]
        );
    }
}
