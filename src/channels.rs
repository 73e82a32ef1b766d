//! # Channel Bank
//!
//! Owns the boolean output channels and enforces the safety rule that at most
//! one channel is ON at a time. Every state read goes back to the output line
//! itself, so reported state is what the line actually shows.

use serde::{Deserialize, Serialize};

use crate::error_queue::ErrorCode;

/// Upper bound on channels a bank can be configured with.
pub const MAX_CHANNELS: usize = 8;

/// Electrical level of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Which level means "ON".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    pub fn level_for(self, on: bool) -> Level {
        match (self, on) {
            (Polarity::ActiveHigh, true) | (Polarity::ActiveLow, false) => Level::High,
            (Polarity::ActiveHigh, false) | (Polarity::ActiveLow, true) => Level::Low,
        }
    }

    pub fn is_on(self, level: Level) -> bool {
        level == self.level_for(true)
    }
}

/// One driveable output, e.g. a GPIO pin wired to a laser's TTL input.
pub trait OutputLine: Send {
    fn write(&mut self, level: Level);
    fn read(&self) -> Level;
}

/// In-memory line for simulation and tests.
#[derive(Debug, Clone)]
pub struct SimulatedLine {
    level: Level,
}

impl SimulatedLine {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for SimulatedLine {
    fn default() -> Self {
        Self::new(Level::Low)
    }
}

impl OutputLine for SimulatedLine {
    fn write(&mut self, level: Level) {
        self.level = level;
    }

    fn read(&self) -> Level {
        self.level
    }
}

/// Channels addressed 1..=N over their output lines.
pub struct ChannelBank {
    lines: Vec<Box<dyn OutputLine>>,
    polarity: Polarity,
}

impl ChannelBank {
    /// Builds a bank and drives every line to OFF.
    pub fn new(lines: Vec<Box<dyn OutputLine>>, polarity: Polarity) -> Self {
        let mut bank = Self { lines, polarity };
        bank.all_off();
        bank
    }

    /// A bank of `count` simulated lines.
    pub fn simulated(count: usize, polarity: Polarity) -> Self {
        let lines = (0..count)
            .map(|_| Box::new(SimulatedLine::default()) as Box<dyn OutputLine>)
            .collect();
        Self::new(lines, polarity)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maps a 1-based channel number to a slot, rejecting anything outside 1..=N.
    pub fn resolve(&self, index: usize) -> Result<usize, ErrorCode> {
        if index == 0 || index > self.lines.len() {
            return Err(ErrorCode::ParameterOutOfRange);
        }
        Ok(index - 1)
    }

    pub fn get(&self, index: usize) -> Result<bool, ErrorCode> {
        let slot = self.resolve(index)?;
        Ok(self.polarity.is_on(self.lines[slot].read()))
    }

    /// Drives one channel. Turning a channel ON first turns every channel OFF.
    pub fn set(&mut self, index: usize, on: bool) -> Result<(), ErrorCode> {
        let slot = self.resolve(index)?;
        if on {
            self.all_off();
        }
        self.drive(slot, on);
        log::debug!("channel {} -> {}", index, if on { "ON" } else { "OFF" });
        Ok(())
    }

    /// Flips a channel based on what its line currently shows.
    pub fn toggle_exclusive(&mut self, index: usize) -> Result<bool, ErrorCode> {
        let on = !self.get(index)?;
        self.set(index, on)?;
        Ok(on)
    }

    pub fn all_off(&mut self) {
        for slot in 0..self.lines.len() {
            self.drive(slot, false);
        }
    }

    /// Every channel's state in channel order.
    pub fn states(&self) -> Vec<bool> {
        self.lines
            .iter()
            .map(|line| self.polarity.is_on(line.read()))
            .collect()
    }

    fn drive(&mut self, slot: usize, on: bool) {
        let level = self.polarity.level_for(on);
        self.lines[slot].write(level);
    }
}
