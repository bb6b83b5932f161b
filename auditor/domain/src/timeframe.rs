use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;

/// Converts a timeframe label such as `"15m"` or `"4h"` into its interval in seconds.
///
/// Accepted labels are `<integer><unit>` where unit is one of `m`, `h` or `d`.
pub fn parse_interval(timeframe: &str) -> Result<i64, TimeframeError> {
    let invalid = || TimeframeError::InvalidTimeframe(timeframe.to_string());

    let unit = timeframe.chars().last().ok_or_else(invalid)?;
    let unit_seconds = match unit {
        'm' => SECONDS_PER_MINUTE,
        'h' => SECONDS_PER_HOUR,
        'd' => SECONDS_PER_DAY,
        _ => return Err(invalid()),
    };

    let count = &timeframe[..timeframe.len() - unit.len_utf8()];
    if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let count: i64 = count.parse().map_err(|_| invalid())?;
    let seconds = count.checked_mul(unit_seconds).ok_or_else(invalid)?;
    if seconds <= 0 || TimeDelta::try_seconds(seconds).is_none() {
        return Err(invalid());
    }

    Ok(seconds)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    label: String,
    interval_seconds: i64,
}

impl Timeframe {
    pub fn new(label: &str) -> Result<Self, TimeframeError> {
        let interval_seconds = parse_interval(label)?;
        Ok(Self {
            label: label.to_string(),
            interval_seconds,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn interval_seconds(&self) -> i64 {
        self.interval_seconds
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.label
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeframeError {
    #[error("Invalid timeframe: '{0}'")]
    InvalidTimeframe(String),
}
