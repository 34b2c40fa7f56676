use core::fmt;

/// Problems reported by the touch pipeline's control surface.
///
/// Every variant is a local validation failure returned synchronously from a
/// configuration or query call. Nothing in the per-cycle processing path can
/// fail; a channel whose configuration would be rejected simply never leaves
/// `Inactive`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The channel id is outside the sensor's channel range, or the operation
    /// needs an enabled (or proximity-designated) channel and this one isn't.
    InvalidChannel(u8),
    /// A configuration value is out of its accepted range.
    ///
    /// Examples: a debounce count the signed debounce counter cannot hold, a
    /// proximity window of zero cycles, a detect fraction outside `0.0..=1.0`,
    /// a jitter step above 15.
    InvalidConfiguration,
    /// The operation is not allowed in the sensor's current state.
    ///
    /// Configuration changes require scanning to be stopped; a one-shot
    /// trigger requires a one-shot session; sleep operations need a configured
    /// sleep channel.
    NotInState,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChannel(ch) => write!(f, "invalid touch channel {}", ch),
            Self::InvalidConfiguration => f.write_str("invalid touch configuration"),
            Self::NotInState => f.write_str("operation not allowed in current sensor state"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
