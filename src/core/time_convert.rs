//! Conversion between clock times and fractional hours or days.
//!
//! Scalars convert to scalars and slices to vectors of the same length and
//! order. The inverse decomposes greedily and truncates at each stage, so a
//! round trip is stable to the microsecond but never rounds up.

use std::fmt;
use std::str::FromStr;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::core::error::TimeError;

const US_PER_SECOND: f64 = 1e6;

/// Wall-clock time of day with microsecond resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockTime {
    /// Hour, 0–23.
    pub hour: u32,
    /// Minute, 0–59.
    pub minute: u32,
    /// Second, 0–59.
    pub second: u32,
    /// Microsecond, 0–999 999.
    pub microsecond: u32,
}

impl ClockTime {
    /// Build a clock time with whole seconds.
    #[must_use]
    pub const fn hms(hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
            microsecond: 0,
        }
    }

    /// Parse `HH:MM:SS` or `HH:MM:SS.ffffff`.
    ///
    /// # Errors
    ///
    /// Returns `TimeError::InvalidClock` if the text does not match either
    /// form or a field is out of range.
    pub fn parse(text: &str) -> Result<Self, TimeError> {
        let invalid = || TimeError::InvalidClock(text.to_string());
        let trimmed = text.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((whole, frac)) => (whole, Some(frac)),
            None => (trimmed, None),
        };

        let mut fields = whole.split(':').map(|f| f.parse::<u32>().map_err(|_| invalid()));
        let hour = fields.next().ok_or_else(invalid)??;
        let minute = fields.next().ok_or_else(invalid)??;
        let second = fields.next().ok_or_else(invalid)??;
        if fields.next().is_some() {
            return Err(invalid());
        }

        let microsecond = match frac {
            None => 0,
            Some(f) if f.is_empty() || f.len() > 6 || !f.bytes().all(|b| b.is_ascii_digit()) => {
                return Err(invalid());
            }
            // Right-pad so ".5" reads as 500 000 us.
            Some(f) => format!("{f:0<6}").parse::<u32>().map_err(|_| invalid())?,
        };

        if hour > 23 || minute > 59 || second > 59 {
            return Err(invalid());
        }
        Ok(Self {
            hour,
            minute,
            second,
            microsecond,
        })
    }

    /// Render as `HH:MM:SS`, dropping sub-second precision.
    #[must_use]
    pub fn to_hms_string(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.to_hms_string(), self.microsecond)
    }
}

impl<T: Timelike> From<&T> for ClockTime {
    fn from(t: &T) -> Self {
        Self {
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
            // Leap seconds report nanoseconds above 1e9; fold them into the last microsecond.
            microsecond: (t.nanosecond() / 1_000).min(999_999),
        }
    }
}

/// Unit of a fractional time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Fraction of a 24-hour period expressed in hours, `[0, 24)`.
    Hours,
    /// Fraction of a day, `[0, 1)`.
    Days,
}

impl FromStr for TimeUnit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "decimal hours" | "hours" => Ok(Self::Hours),
            "decimal days" | "days" => Ok(Self::Days),
            other => Err(TimeError::InvalidUnit(other.to_string())),
        }
    }
}

/// Shape of the inverse conversion's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// A `ClockTime` value.
    Clock,
    /// `HH:MM:SS` text.
    Text,
}

impl FromStr for OutputFormat {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "datetime" | "clock" => Ok(Self::Clock),
            "hms" | "text" => Ok(Self::Text),
            other => Err(TimeError::InvalidOutputFormat(other.to_string())),
        }
    }
}

/// Result of converting a fractional value back to a time of day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FractionalTime {
    /// Requested with `OutputFormat::Clock`.
    Clock(ClockTime),
    /// Requested with `OutputFormat::Text`.
    Text(String),
}

impl FractionalTime {
    /// The clock value, if this was produced in clock form.
    #[must_use]
    pub const fn as_clock(&self) -> Option<ClockTime> {
        match self {
            Self::Clock(c) => Some(*c),
            Self::Text(_) => None,
        }
    }
}

/// Times that can be expressed as fractional hours or days.
pub trait Fractional {
    /// `f64` for a single time, `Vec<f64>` for a sequence.
    type Output;

    /// Convert into the given unit.
    fn to_fractional(&self, unit: TimeUnit) -> Self::Output;
}

impl Fractional for ClockTime {
    type Output = f64;

    fn to_fractional(&self, unit: TimeUnit) -> f64 {
        let hours = f64::from(self.hour);
        let mins = f64::from(self.minute);
        let secs = f64::from(self.second);
        let usecs = f64::from(self.microsecond);
        match unit {
            TimeUnit::Hours => hours + mins / 60.0 + secs / 3600.0 + usecs / 3.6e9,
            TimeUnit::Days => hours / 24.0 + mins / 1440.0 + secs / 86400.0 + usecs / 8.64e10,
        }
    }
}

impl Fractional for [ClockTime] {
    type Output = Vec<f64>;

    fn to_fractional(&self, unit: TimeUnit) -> Vec<f64> {
        self.iter().map(|t| t.to_fractional(unit)).collect()
    }
}

impl Fractional for Vec<ClockTime> {
    type Output = Vec<f64>;

    fn to_fractional(&self, unit: TimeUnit) -> Vec<f64> {
        self.as_slice().to_fractional(unit)
    }
}

/// Convert a time, or a sequence of times, to fractional hours or days.
pub fn to_fractional<T: Fractional + ?Sized>(time: &T, unit: TimeUnit) -> T::Output {
    time.to_fractional(unit)
}

/// Convert a fractional value back to a time of day.
///
/// # Errors
///
/// Returns `TimeError::OutOfRange` when the value is negative, not finite,
/// or reaches a full day.
pub fn from_fractional(
    value: f64,
    unit: TimeUnit,
    output: OutputFormat,
) -> Result<FractionalTime, TimeError> {
    let clock = decompose(value, unit)?;
    Ok(match output {
        OutputFormat::Clock => FractionalTime::Clock(clock),
        OutputFormat::Text => FractionalTime::Text(clock.to_hms_string()),
    })
}

/// Sequence form of [`from_fractional`]; output order and length match the input.
///
/// # Errors
///
/// Fails on the first out-of-range value.
pub fn from_fractional_seq(
    values: &[f64],
    unit: TimeUnit,
    output: OutputFormat,
) -> Result<Vec<FractionalTime>, TimeError> {
    values.iter().map(|v| from_fractional(*v, unit, output)).collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn decompose(value: f64, unit: TimeUnit) -> Result<ClockTime, TimeError> {
    let hours = match unit {
        TimeUnit::Hours => value,
        TimeUnit::Days => value * 24.0,
    };
    if !hours.is_finite() || hours < 0.0 || hours >= 24.0 {
        return Err(TimeError::OutOfRange(value));
    }

    let h = hours.trunc();
    let mins = (hours - h) * 60.0;
    let m = mins.trunc();
    let secs = (mins - m) * 60.0;
    let s = secs.trunc();
    let usecs = (secs - s) * US_PER_SECOND;

    Ok(ClockTime {
        hour: h as u32,
        minute: m as u32,
        second: s as u32,
        microsecond: usecs.trunc() as u32,
    })
}
