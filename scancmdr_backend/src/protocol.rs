//! The ordered command list of one DSP program, and its rendering to wire text.
//!
//! A [`Protocol`] is append-only: commands are stored in the order they were authored, which is
//! not necessarily cycle order (the DSP expects commands ascending per channel, and the generators
//! are responsible for that). Loop nesting has no runtime representation beyond matched
//! `S`/`E` commands; [`Protocol::check_loops`] verifies it after the fact.
//!
//! Rendering prefixes the clear command and emits one line per command:
//!
//! ```text
//! C
//! AS,0,9,1
//! AV,0,4,-1368
//! AV,0,3,-1236
//! AV,40000,7,4
//! AV,60000,7,0
//! AE,240050,9,1
//! ```
//!
//! Execute (`X`) is not part of the rendered text; issuing it is up to the transport.

use crate::channel::{Axis, Channel};
use crate::error::{ScanError, ScanResult};
use crate::instruction::*;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Protocol {
    commands: Vec<Command>,
}

impl Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of rendered lines, counting the leading clear.
    pub fn line_count(&self) -> usize {
        self.commands.len() + 1
    }

    // Base method through which every command is added
    fn push(&mut self, scan: ScanCmd, cycle: u64, channel: Channel, value: i64) -> ScanResult<()> {
        let cmd = Command::new(scan, cycle, channel, value)?;
        self.commands.try_reserve(1)?;
        self.commands.push(cmd);
        Ok(())
    }

    /// Absolute position of one mirror.
    pub fn append_move(&mut self, axis: Axis, cycle: u64, position: i64) -> ScanResult<()> {
        self.push(ScanCmd::Set, cycle, axis.channel(), position)
    }

    /// Position change of one mirror, in microcounts.
    pub fn append_rel(&mut self, axis: Axis, cycle: u64, delta: i64) -> ScanResult<()> {
        self.push(ScanCmd::Relative, cycle, axis.channel(), delta)
    }

    /// Loop boundary on the loop pseudo-channel.
    ///
    /// The DSP only reads the repetition count of a start command; the matching end carries the
    /// same count so the protocol reads unambiguously.
    pub fn append_loop(&mut self, mark: LoopMark, cycle: u64, repetitions: u64) -> ScanResult<()> {
        let value = i64::try_from(repetitions).map_err(|_| {
            ScanError::FieldRange(format!("loop repetition count {} too large", repetitions))
        })?;
        self.push(mark.into(), cycle, Channel::LOOP, value)
    }

    pub fn append_trig_out(&mut self, cycle: u64, level: TriggerLevel) -> ScanResult<()> {
        self.push(ScanCmd::Set, cycle, Channel::DIGITAL_OUT, level as i64)
    }

    pub fn append_trig_in(&mut self, cycle: u64, edge: Edge) -> ScanResult<()> {
        self.push(edge.into(), cycle, Channel::DIGITAL_OUT, 0)
    }

    pub fn append_incr(&mut self, cycle: u64, channel: Channel, increment: i64) -> ScanResult<()> {
        self.push(ScanCmd::Increment, cycle, channel, increment)
    }

    pub fn append_offset(&mut self, cycle: u64, channel: Channel, offset: i64) -> ScanResult<()> {
        self.push(ScanCmd::Offset, cycle, channel, offset)
    }

    pub fn append_wait(&mut self, cycle: u64) -> ScanResult<()> {
        self.push(ScanCmd::Wait, cycle, Channel::new(0)?, 0)
    }

    /// Verifies that loop commands nest.
    ///
    /// Every end must close the innermost open start with the same repetition count and at a
    /// cycle strictly after that start, and no start may be left open.
    pub fn check_loops(&self) -> ScanResult<()> {
        let mut open: Vec<&Command> = Vec::new();
        for (idx, cmd) in self.commands.iter().enumerate() {
            match cmd.scan() {
                ScanCmd::LoopStart => open.push(cmd),
                ScanCmd::LoopEnd => {
                    let start = open.pop().ok_or_else(|| {
                        ScanError::LoopMismatch(format!("command {} ({}) closes no loop", idx, cmd))
                    })?;
                    if start.value() != cmd.value() || cmd.cycle() <= start.cycle() {
                        return Err(ScanError::LoopMismatch(format!(
                            "command {} ({}) does not match its start ({})",
                            idx, cmd, start
                        )));
                    }
                }
                _ => {}
            }
        }
        match open.last() {
            Some(start) => Err(ScanError::LoopMismatch(format!(
                "{} loop(s) left open, innermost ({})",
                open.len(),
                start
            ))),
            None => Ok(()),
        }
    }

    /// Exact byte length of [`Protocol::render`]'s output.
    pub fn rendered_len(&self) -> usize {
        2 + self.commands.iter().map(Command::wire_len).sum::<usize>()
    }

    /// Renders the protocol in the DSP's line format, starting with the clear command.
    ///
    /// The text buffer is reserved once at its exact final size.
    ///
    /// # Examples
    ///
    /// ```
    /// use scancmdr_backend::channel::Axis;
    /// use scancmdr_backend::protocol::Protocol;
    ///
    /// let mut prot = Protocol::new();
    /// prot.append_move(Axis::X, 10, 5000).unwrap();
    /// assert_eq!(prot.render().unwrap(), "C\nAV,10,4,5000\n");
    /// ```
    pub fn render(&self) -> ScanResult<String> {
        use std::fmt::Write;

        let len = self.rendered_len();
        let mut text = String::new();
        text.try_reserve_exact(len)?;
        text.push(ControlCmd::Clear.as_char());
        text.push('\n');
        for cmd in &self.commands {
            // Writing into a String cannot fail
            let _ = writeln!(text, "{}", cmd);
        }
        debug_assert_eq!(text.len(), len);
        Ok(text)
    }
}
