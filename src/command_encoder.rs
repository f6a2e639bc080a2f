//! Wire command construction.
//!
//! The firmware tokenizes plain ASCII with no framing, so each operation maps
//! to one fixed textual shape. Inputs are already validated, so nothing here
//! can fail.

use crate::validator::{PwmSet, RobomasSet, ValidatedValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller operating mode, one per front-end tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// PWM motor board ("丼モタ")
    #[default]
    Donmota,
    /// Robomaster CAN motors
    Robomas,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Donmota => f.write_str("donmota"),
            Mode::Robomas => f.write_str("robomas"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Run {
    Start,
    Stop,
}

/// Final ASCII byte sequence handed to the serial link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireCommand(String);

impl WireCommand {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn mode_switch(mode: Mode) -> WireCommand {
    match mode {
        Mode::Donmota => WireCommand("md".into()),
        Mode::Robomas => WireCommand("mr".into()),
    }
}

pub fn set_can_id(id: ValidatedValue) -> WireCommand {
    WireCommand(format!("c{}", id.value()))
}

pub fn set_count(count: ValidatedValue) -> WireCommand {
    WireCommand(format!("n{}", count.value()))
}

fn channel_fields<'a>(prefix: char, values: impl Iterator<Item = &'a ValidatedValue>) -> String {
    values
        .enumerate()
        .map(|(i, v)| format!("{}{}:{}", prefix, i, v.value()))
        .collect::<Vec<_>>()
        .join(",")
}

/// `p0:{v0},p1:{v1},p2:{v2},p3:{v3}`
pub fn set_all_pwm(set: &PwmSet) -> WireCommand {
    WireCommand(channel_fields('p', set.iter()))
}

/// `r0:{v0},...,r7:{v7}`
pub fn set_all_robomas(set: &RobomasSet) -> WireCommand {
    WireCommand(channel_fields('r', set.iter()))
}

/// Same value to every channel of the current mode.
pub fn broadcast(value: ValidatedValue) -> WireCommand {
    WireCommand(value.value().to_string())
}

/// Single-value command of the minimal sender. The firmware's line reader
/// expects the newline here and nowhere else.
pub fn legacy_scalar(value: ValidatedValue) -> WireCommand {
    WireCommand(format!("{}\n", value.value()))
}

pub fn run(run: Run) -> WireCommand {
    match run {
        Run::Start => WireCommand("i".into()),
        Run::Stop => WireCommand("o".into()),
    }
}
