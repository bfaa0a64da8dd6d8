//! Provides definitions for the commands that make up a DSP protocol.
//!
//! ## Main Structures and Enumerations:
//!
//! - `ScanCmd`: the scan command character of a line (`V`, `R`, `I`, `O`, `S`, `E`, `0`, `U`, `D`).
//!
//! - `Command`: one `A` (add) line of a protocol, consisting of a scan command, the cycle at which it
//!   executes, the channel it addresses and a value. Its `Display` implementation is the exact wire
//!   format `A<scan>,<cycle>,<channel>,<value>` (without the line terminator).
//!
//! - `LoopMark`, `TriggerLevel`, `Edge`: closed sets of arguments for loop, digital-out and
//!   trigger-in commands. A loop command without a start/end designator cannot be expressed.
//!
//! ## Field ranges
//!
//! Cycles are 48-bit unsigned on the DSP and values are 48-bit signed. `Command::new` rejects
//! anything wider so that an out-of-range protocol never reaches the wire.

use std::fmt;

use crate::channel::Channel;
use crate::error::{ScanError, ScanResult};
use crate::timing::MAX_CYCLE;

/// Largest magnitude representable in a signed 48-bit value field.
pub const MAX_VALUE: i64 = (1 << 47) - 1;
pub const MIN_VALUE: i64 = -(1 << 47);

/// DSP control command preceding every protocol line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCmd {
    Clear,
    Add,
    Execute,
}
impl ControlCmd {
    pub fn as_char(&self) -> char {
        match self {
            ControlCmd::Clear => 'C',
            ControlCmd::Add => 'A',
            ControlCmd::Execute => 'X',
        }
    }
}

/// Scan command of an `A` line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanCmd {
    /// `V`: set the value of an output channel.
    Set,
    /// `R`: set value relative to the current value.
    Relative,
    /// `I`: value added to the channel every cycle.
    Increment,
    /// `O`: switch the position offset on and off.
    Offset,
    LoopStart,
    LoopEnd,
    /// `0`: do nothing.
    Wait,
    RisingTrigger,
    FallingTrigger,
}
impl ScanCmd {
    pub fn as_char(&self) -> char {
        match self {
            ScanCmd::Set => 'V',
            ScanCmd::Relative => 'R',
            ScanCmd::Increment => 'I',
            ScanCmd::Offset => 'O',
            ScanCmd::LoopStart => 'S',
            ScanCmd::LoopEnd => 'E',
            ScanCmd::Wait => '0',
            ScanCmd::RisingTrigger => 'U',
            ScanCmd::FallingTrigger => 'D',
        }
    }
}
impl fmt::Display for ScanCmd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMark {
    Start,
    End,
}
impl From<LoopMark> for ScanCmd {
    fn from(mark: LoopMark) -> ScanCmd {
        match mark {
            LoopMark::Start => ScanCmd::LoopStart,
            LoopMark::End => ScanCmd::LoopEnd,
        }
    }
}

/// Output levels of the digital-out channel.
///
/// The low bits select which of the two TTL lines is high: the trigger line (`T-OUT`), used to
/// trigger other devices, and the digital line (`D-OUT`), which gates the laser shutter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerLevel {
    BothLow = 0,
    TriggerHigh = 2,
    LaserHigh = 4,
    BothHigh = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}
impl From<Edge> for ScanCmd {
    fn from(edge: Edge) -> ScanCmd {
        match edge {
            Edge::Rising => ScanCmd::RisingTrigger,
            Edge::Falling => ScanCmd::FallingTrigger,
        }
    }
}

/// One `A` line of a protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    scan: ScanCmd,
    cycle: u64,
    channel: Channel,
    value: i64,
}
impl Command {
    /// Constructs a `Command`, checking that cycle and value fit their 48-bit wire fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use scancmdr_backend::channel::Channel;
    /// use scancmdr_backend::instruction::*;
    ///
    /// let cmd = Command::new(ScanCmd::Set, 10, Channel::GALVO_X, 5000).unwrap();
    /// assert_eq!(cmd.to_string(), "AV,10,4,5000");
    ///
    /// // Cycles are 48 bit wide on the DSP
    /// assert!(Command::new(ScanCmd::Set, 1 << 48, Channel::GALVO_X, 0).is_err());
    /// ```
    pub fn new(scan: ScanCmd, cycle: u64, channel: Channel, value: i64) -> ScanResult<Self> {
        if cycle > MAX_CYCLE {
            return Err(ScanError::FieldRange(format!(
                "cycle {} exceeds the 48-bit cycle counter",
                cycle
            )));
        }
        if !(MIN_VALUE..=MAX_VALUE).contains(&value) {
            return Err(ScanError::FieldRange(format!(
                "value {} on channel {} does not fit 48 bits",
                value, channel
            )));
        }
        Ok(Command {
            scan,
            cycle,
            channel,
            value,
        })
    }

    pub fn scan(&self) -> ScanCmd {
        self.scan
    }
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
    pub fn channel(&self) -> Channel {
        self.channel
    }
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Number of bytes of the rendered line, including the trailing newline.
    pub fn wire_len(&self) -> usize {
        // control char, scan char, three commas and the newline
        6 + decimal_len(self.cycle)
            + decimal_len(u64::from(self.channel.number()))
            + decimal_len(self.value.unsigned_abs())
            + usize::from(self.value < 0)
    }
}
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{},{},{},{}",
            ControlCmd::Add.as_char(),
            self.scan,
            self.cycle,
            self.channel,
            self.value
        )
    }
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_len_matches_display() {
        let cmds = [
            Command::new(ScanCmd::LoopStart, 0, Channel::LOOP, 1).unwrap(),
            Command::new(ScanCmd::Relative, 123456, Channel::GALVO_Y, -99000).unwrap(),
            Command::new(ScanCmd::Set, MAX_CYCLE, Channel::GALVO_X, MIN_VALUE).unwrap(),
            Command::new(ScanCmd::Wait, 10, Channel::new(0).unwrap(), 0).unwrap(),
        ];
        for cmd in cmds {
            assert_eq!(cmd.wire_len(), cmd.to_string().len() + 1, "{}", cmd);
        }
    }

    #[test]
    fn value_range_is_signed_48_bit() {
        assert!(Command::new(ScanCmd::Set, 0, Channel::GALVO_X, MAX_VALUE).is_ok());
        assert!(Command::new(ScanCmd::Set, 0, Channel::GALVO_X, MAX_VALUE + 1).is_err());
        assert!(Command::new(ScanCmd::Set, 0, Channel::GALVO_X, MIN_VALUE - 1).is_err());
    }

    #[test]
    fn trigger_levels_are_wire_values() {
        assert_eq!(TriggerLevel::BothLow as i64, 0);
        assert_eq!(TriggerLevel::TriggerHigh as i64, 2);
        assert_eq!(TriggerLevel::LaserHigh as i64, 4);
        assert_eq!(TriggerLevel::BothHigh as i64, 6);
    }
}
