//! Job schedules.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Duration, OffsetDateTime, Time, UtcOffset, Weekday};

/// When a background job fires. All wall-clock times are UTC.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schedule {
    /// Never fire automatically.
    Disabled,
    /// Fire every `every_secs` seconds.
    Interval { every_secs: u64 },
    /// Fire once a day at `at` (`HH:MM`).
    Daily { at: String },
    /// Fire once a week on `weekday` at `at` (`HH:MM`).
    Weekly { weekday: String, at: String },
}

impl Schedule {
    /// Convenience constructor for daily schedules.
    pub fn daily(at: &str) -> Self {
        Self::Daily { at: at.to_string() }
    }

    /// Convenience constructor for weekly schedules.
    pub fn weekly(weekday: &str, at: &str) -> Self {
        Self::Weekly {
            weekday: weekday.to_string(),
            at: at.to_string(),
        }
    }

    /// Validate schedule fields.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Interval { every_secs } => {
                if *every_secs == 0 {
                    return Err(Error::InvalidSchedule(
                        "interval every_secs must be greater than 0".to_string(),
                    ));
                }
                if *every_secs > i64::MAX as u64 {
                    return Err(Error::InvalidSchedule(format!(
                        "interval every_secs {every_secs} is too large"
                    )));
                }
                Ok(())
            }
            Self::Daily { at } => parse_clock(at).map(|_| ()),
            Self::Weekly { weekday, at } => {
                parse_weekday(weekday)?;
                parse_clock(at).map(|_| ())
            }
        }
    }

    /// Next fire time strictly after `now`, or `None` when disabled.
    pub fn next_after(&self, now: OffsetDateTime) -> Result<Option<OffsetDateTime>> {
        let now = now.to_offset(UtcOffset::UTC);
        match self {
            Self::Disabled => Ok(None),
            Self::Interval { every_secs } => {
                let secs = i64::try_from(*every_secs).unwrap_or(i64::MAX);
                Ok(now.checked_add(Duration::seconds(secs)))
            }
            Self::Daily { at } => {
                let clock = parse_clock(at)?;
                let today = now.replace_time(clock);
                Ok(Some(if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }))
            }
            Self::Weekly { weekday, at } => {
                let weekday = parse_weekday(weekday)?;
                let clock = parse_clock(at)?;
                let next = (0..=7)
                    .map(|offset| now.replace_time(clock) + Duration::days(offset))
                    .find(|candidate| candidate.weekday() == weekday && *candidate > now);
                Ok(next)
            }
        }
    }
}

fn parse_clock(value: &str) -> Result<Time> {
    Time::parse(value.trim(), format_description!("[hour]:[minute]"))
        .map_err(|e| Error::InvalidSchedule(format!("invalid time '{value}' (expected HH:MM): {e}")))
}

fn parse_weekday(value: &str) -> Result<Weekday> {
    let lower = value.trim().to_ascii_lowercase();
    let weekday = match lower.get(..3).unwrap_or_default() {
        "mon" => Weekday::Monday,
        "tue" => Weekday::Tuesday,
        "wed" => Weekday::Wednesday,
        "thu" => Weekday::Thursday,
        "fri" => Weekday::Friday,
        "sat" => Weekday::Saturday,
        "sun" => Weekday::Sunday,
        _ => {
            return Err(Error::InvalidSchedule(format!("invalid weekday '{value}'")));
        }
    };
    Ok(weekday)
}
