//! DSP channel numbering.
//!
//! The DSP multiplexes its outputs over 14 timeslots which are grouped into channels.
//! Only a handful matter for a two-mirror rig:
//!
//! | Channel | Function |
//! |---|---|
//! | 3 | position galvo 0 (Y mirror) |
//! | 4 | position galvo 1 (X mirror) |
//! | 7 | digital out (trigger and laser shutter lines) |
//! | 9 | loop pseudo-channel, ignored by the DSP |

use std::fmt;

use crate::error::{ScanError, ScanResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Channel(u8);

impl Channel {
    pub const GALVO_Y: Channel = Channel(3);
    pub const GALVO_X: Channel = Channel(4);
    pub const DIGITAL_OUT: Channel = Channel(7);
    pub const LOOP: Channel = Channel(9);
    /// Highest addressable channel (the loop pseudo-channel).
    pub const MAX: u8 = 9;

    pub fn new(number: u8) -> ScanResult<Self> {
        if number > Self::MAX {
            return Err(ScanError::FieldRange(format!(
                "channel {} is outside 0..={}",
                number,
                Self::MAX
            )));
        }
        Ok(Channel(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mirror axis. Absolute and relative moves can only address these two channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn channel(&self) -> Channel {
        match self {
            Axis::X => Channel::GALVO_X,
            Axis::Y => Channel::GALVO_Y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_channels_match_wiring() {
        assert_eq!(Axis::X.channel().number(), 4);
        assert_eq!(Axis::Y.channel().number(), 3);
    }

    #[test]
    fn rejects_channel_past_loop() {
        assert!(Channel::new(9).is_ok());
        assert!(matches!(Channel::new(10), Err(ScanError::FieldRange(_))));
    }
}
