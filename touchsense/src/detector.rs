use crate::config::ChannelConfig;

/// Enumeration of channel activation states
///
/// The pending states carry the number of consecutive qualifying cycles seen
/// so far.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    Inactive,
    PendingActive(u8),
    Active,
    PendingInactive(u8),
}

/// A committed state change
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Deactivated,
}

/// Debounced threshold detector with hysteresis for one channel
#[derive(Clone, Copy, Debug)]
pub struct ActivationDetector {
    pub state: DetectorState,
}

impl ActivationDetector {
    pub const fn new() -> Self {
        Self {
            state: DetectorState::Inactive,
        }
    }

    /// True once activation has been committed and until deactivation is
    pub fn active(&self) -> bool {
        matches!(self.state, DetectorState::Active | DetectorState::PendingInactive(_))
    }

    /// Signed debounce progress: positive toward active, negative toward inactive
    pub fn debounce_counter(&self) -> i8 {
        match self.state {
            DetectorState::PendingActive(n) => n as i8,
            DetectorState::PendingInactive(n) => -(n as i8),
            _ => 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Inactive;
    }

    /// Process the signal (smoothed value above benchmark) for one cycle
    ///
    /// Returns the transition committed on this cycle, if any.
    pub fn push(&mut self, delta: u32, config: &ChannelConfig) -> Option<Transition> {
        // A debounce of 0 commits on the first qualifying cycle, same as 1
        let debounce = config.debounce.max(1);
        let mut transition = None;

        self.state = match self.state {
            DetectorState::Inactive | DetectorState::PendingActive(_) => {
                if delta >= config.threshold {
                    let count = match self.state {
                        DetectorState::PendingActive(n) => n + 1,
                        _ => 1,
                    };
                    if count >= debounce {
                        transition = Some(Transition::Activated);
                        DetectorState::Active
                    } else {
                        DetectorState::PendingActive(count)
                    }
                } else {
                    DetectorState::Inactive
                }
            }
            DetectorState::Active | DetectorState::PendingInactive(_) => {
                if delta < config.release_threshold() {
                    let count = match self.state {
                        DetectorState::PendingInactive(n) => n + 1,
                        _ => 1,
                    };
                    if count >= debounce {
                        transition = Some(Transition::Deactivated);
                        DetectorState::Inactive
                    } else {
                        DetectorState::PendingInactive(count)
                    }
                } else {
                    DetectorState::Active
                }
            }
        };

        transition
    }
}

impl Default for ActivationDetector {
    fn default() -> Self {
        Self::new()
    }
}
