//! Operator input validation.
//!
//! Turns raw text from the front end into range-checked integers. Every value
//! that reaches the command encoder went through one of these functions.

use serde::Serialize;
use std::fmt;
use std::num::IntErrorKind;
use std::ops::RangeInclusive;
use thiserror::Error;

pub const PWM_MIN_VALUE: i32 = -25000;
pub const PWM_MAX_VALUE: i32 = 25000;
pub const ROBOMAS_MIN_VALUE: i32 = -10000;
pub const ROBOMAS_MAX_VALUE: i32 = 10000;
pub const CAN_ID_MIN: i32 = 1;
pub const CAN_ID_MAX: i32 = 4;
pub const COUNT_MIN: i32 = 1;
pub const COUNT_MAX: i32 = 8;

/// Number of PWM channels on the Donmota board
pub const PWM_COUNT: usize = 4;
/// Number of Robomas motors addressable in one command
pub const ROBOMAS_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueKind {
    Pwm,
    Robomas,
    CanId,
    Count,
}

impl ValueKind {
    pub const fn min(self) -> i32 {
        match self {
            ValueKind::Pwm => PWM_MIN_VALUE,
            ValueKind::Robomas => ROBOMAS_MIN_VALUE,
            ValueKind::CanId => CAN_ID_MIN,
            ValueKind::Count => COUNT_MIN,
        }
    }

    pub const fn max(self) -> i32 {
        match self {
            ValueKind::Pwm => PWM_MAX_VALUE,
            ValueKind::Robomas => ROBOMAS_MAX_VALUE,
            ValueKind::CanId => CAN_ID_MAX,
            ValueKind::Count => COUNT_MAX,
        }
    }

    pub const fn range(self) -> RangeInclusive<i32> {
        self.min()..=self.max()
    }

    /// Label used when reporting a failing element of a channel set
    pub const fn channel_label(self) -> &'static str {
        match self {
            ValueKind::Pwm => "PWM",
            ValueKind::Robomas => "Robomas",
            ValueKind::CanId => "CAN ID",
            ValueKind::Count => "Count",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_label())
    }
}

fn not_an_integer_message(kind: &ValueKind) -> &'static str {
    match kind {
        ValueKind::CanId => "Invalid CAN ID (must be integer)",
        ValueKind::Count => "Invalid robomas count (must be integer)",
        ValueKind::Pwm | ValueKind::Robomas => "Invalid value (must be integer)",
    }
}

fn out_of_range_message(kind: &ValueKind) -> String {
    match kind {
        ValueKind::CanId => format!("CAN ID out of range ({}-{})", CAN_ID_MIN, CAN_ID_MAX),
        ValueKind::Count => format!("Robomas count must be between {} and {}", COUNT_MIN, COUNT_MAX),
        ValueKind::Pwm | ValueKind::Robomas => {
            format!("Value out of range ({}~{})", kind.min(), kind.max())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{}", not_an_integer_message(.kind))]
    NotAnInteger { kind: ValueKind, input: String },
    #[error("{}", out_of_range_message(.kind))]
    OutOfRange { kind: ValueKind, value: i64 },
}

impl ValidationError {
    pub fn kind(&self) -> ValueKind {
        match self {
            ValidationError::NotAnInteger { kind, .. } | ValidationError::OutOfRange { kind, .. } => *kind,
        }
    }
}

fn set_label(source: &ValidationError) -> &'static str {
    source.kind().channel_label()
}

/// Failure of a whole channel set, pointing at the first bad element
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}[{index}]: {source}", set_label(.source))]
pub struct SetError {
    pub index: usize,
    pub source: ValidationError,
}

/// An integer known to lie inside its kind's closed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidatedValue {
    kind: ValueKind,
    value: i32,
}

impl ValidatedValue {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn value(&self) -> i32 {
        self.value
    }
}

impl fmt::Display for ValidatedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Fixed-length, ordered set of validated channel values for one "send all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSet<const N: usize> {
    kind: ValueKind,
    values: [ValidatedValue; N],
}

pub type PwmSet = ChannelSet<PWM_COUNT>;
pub type RobomasSet = ChannelSet<ROBOMAS_COUNT>;

impl<const N: usize> ChannelSet<N> {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn values(&self) -> [i32; N] {
        self.values.map(|v| v.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatedValue> {
        self.values.iter()
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

fn parse_in_range(text: &str, kind: ValueKind) -> Result<ValidatedValue, ValidationError> {
    let trimmed = text.trim();
    let parsed: i64 = match trimmed.parse() {
        Ok(v) => v,
        // Still an integer, just wider than i64; report it at the saturated bound
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
            return Err(ValidationError::OutOfRange { kind, value: i64::MAX })
        }
        Err(e) if *e.kind() == IntErrorKind::NegOverflow => {
            return Err(ValidationError::OutOfRange { kind, value: i64::MIN })
        }
        Err(_) => {
            return Err(ValidationError::NotAnInteger { kind, input: trimmed.to_string() })
        }
    };
    if parsed < kind.min() as i64 || parsed > kind.max() as i64 {
        return Err(ValidationError::OutOfRange { kind, value: parsed });
    }
    Ok(ValidatedValue { kind, value: parsed as i32 })
}

pub fn validate_can_id(text: &str) -> Result<ValidatedValue, ValidationError> {
    parse_in_range(text, ValueKind::CanId)
}

pub fn validate_pwm(text: &str) -> Result<ValidatedValue, ValidationError> {
    parse_in_range(text, ValueKind::Pwm)
}

/// Robomas channels are optional: blank input means 0.
pub fn validate_robomas(text: &str) -> Result<ValidatedValue, ValidationError> {
    if text.trim().is_empty() {
        return Ok(ValidatedValue { kind: ValueKind::Robomas, value: 0 });
    }
    parse_in_range(text, ValueKind::Robomas)
}

/// Number of Robomas motors the controller should drive
pub fn validate_count(text: &str) -> Result<ValidatedValue, ValidationError> {
    parse_in_range(text, ValueKind::Count)
}

fn validate_set<S, const N: usize>(
    texts: &[S; N],
    kind: ValueKind,
    validate: fn(&str) -> Result<ValidatedValue, ValidationError>,
) -> Result<ChannelSet<N>, SetError>
where
    S: AsRef<str>,
{
    // Placeholder zeros are overwritten before the set escapes
    let mut values = [ValidatedValue { kind, value: 0 }; N];
    for (index, (slot, text)) in values.iter_mut().zip(texts.iter()).enumerate() {
        *slot = validate(text.as_ref()).map_err(|source| SetError { index, source })?;
    }
    Ok(ChannelSet { kind, values })
}

pub fn validate_pwm_set<S: AsRef<str>>(texts: &[S; PWM_COUNT]) -> Result<PwmSet, SetError> {
    validate_set(texts, ValueKind::Pwm, validate_pwm)
}

pub fn validate_robomas_set<S: AsRef<str>>(texts: &[S; ROBOMAS_COUNT]) -> Result<RobomasSet, SetError> {
    validate_set(texts, ValueKind::Robomas, validate_robomas)
}
