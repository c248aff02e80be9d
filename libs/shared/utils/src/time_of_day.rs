use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

static HH_MM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").unwrap_or_else(|e| panic!("invalid HH:MM pattern: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeOfDayError {
    #[error("'{0}' is not a valid HH:MM time")]
    Malformed(String),

    #[error("{0} minutes is past the end of the day")]
    OutOfRange(u32),
}

/// A wall-clock time held as minutes since midnight. Rendered and parsed
/// as zero-padded `HH:MM`; single-digit hours are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_minutes(minutes: u32) -> Result<Self, TimeOfDayError> {
        if minutes >= u32::from(MINUTES_PER_DAY) {
            return Err(TimeOfDayError::OutOfRange(minutes));
        }
        Ok(Self(minutes as u16))
    }

    pub fn from_hm(hour: u8, minute: u8) -> Result<Self, TimeOfDayError> {
        if minute >= 60 {
            return Err(TimeOfDayError::Malformed(format!("{hour}:{minute}")));
        }
        Self::from_minutes(u32::from(hour) * 60 + u32::from(minute))
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }

    /// The time `minutes` later, or `None` once that crosses midnight.
    pub fn checked_add_minutes(self, minutes: u32) -> Option<Self> {
        Self::from_minutes(self.minutes() + minutes).ok()
    }

    pub fn to_naive_time(self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_num_seconds_from_midnight_opt(self.minutes() * 60, 0)
            .unwrap_or(chrono::NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeOfDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = HH_MM
            .captures(s.trim())
            .ok_or_else(|| TimeOfDayError::Malformed(s.to_string()))?;
        let hour: u8 = caps[1].parse().map_err(|_| TimeOfDayError::Malformed(s.to_string()))?;
        let minute: u8 = caps[2].parse().map_err(|_| TimeOfDayError::Malformed(s.to_string()))?;
        Self::from_hm(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Postgres `time` columns come back as HH:MM:SS.
        let trimmed = match raw.len() {
            8 if raw.ends_with(":00") => &raw[..5],
            _ => raw.as_str(),
        };
        trimmed.parse().map_err(serde::de::Error::custom)
    }
}
