//! Daily on-call roster.
//!
//! The roster holds one duty per calendar day, imported from an external feed.
//! Feeds are maintained by hand in spreadsheets, so dates arrive in several
//! day-first layouts and every text field is optional except the name.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use time::{Date, Month};

/// Wire format of a roster feed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DutyFormat {
    /// Header row plus one duty per line.
    #[default]
    Csv,
    /// A JSON array of objects.
    Json,
}

impl DutyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// One day of the roster, validated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyEntry {
    pub duty_date: Date,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl DutyEntry {
    /// Build an entry from loosely typed feed fields.
    ///
    /// The date and the name are required; blank optional fields become `None`.
    pub fn from_fields(
        date: Option<&str>,
        name: Option<&str>,
        phone: Option<&str>,
        email: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Self> {
        let date = clean(date).ok_or_else(|| Error::validation("date", "missing duty date"))?;
        let duty_date = parse_duty_date(&date)?;
        let name = clean(name).ok_or_else(|| Error::validation("name", "missing duty name"))?;
        Ok(Self {
            duty_date,
            name,
            phone: clean(phone),
            email: clean(email),
            notes: clean(notes),
        })
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a roster date.
///
/// Accepts `YYYY-MM-DD` and `YYYY/MM/DD`, day-first `DD.MM.YYYY`,
/// `DD/MM/YYYY` and `DD-MM-YYYY` (two-digit years too), and month-first
/// `MM/DD/YYYY` when the day-first reading is impossible. A trailing time
/// (`2026-03-04 00:00:00`, `2026-03-04T00:00`) is ignored.
pub fn parse_duty_date(value: &str) -> Result<Date> {
    let invalid = |reason: &str| Error::validation("date", format!("'{value}': {reason}"));

    let token = value
        .trim()
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or_default();
    let separator = token
        .chars()
        .find(|c| matches!(c, '-' | '.' | '/'))
        .ok_or_else(|| invalid("no date separator"))?;
    let parts: Vec<&str> = token.split(separator).collect();
    let [first, second, third] = parts.as_slice() else {
        return Err(invalid("expected three date components"));
    };
    if ![first, second, third]
        .iter()
        .all(|p| !p.is_empty() && p.len() <= 4 && p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid("date components must be numeric"));
    }

    if first.len() == 4 {
        return calendar_date(first, second, third).ok_or_else(|| invalid("no such day"));
    }
    if third.len() != 4 && third.len() != 2 {
        return Err(invalid("unrecognized year"));
    }
    if let Some(date) = calendar_date(third, second, first) {
        return Ok(date);
    }
    if separator == '/'
        && let Some(date) = calendar_date(third, first, second)
    {
        return Ok(date);
    }
    Err(invalid("no such day"))
}

fn calendar_date(year: &str, month: &str, day: &str) -> Option<Date> {
    let mut year: i32 = year.parse().ok()?;
    if year < 100 {
        // Two-digit years pivot at 69, like strptime's %y.
        year += if year < 69 { 2000 } else { 1900 };
    }
    let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    Date::from_calendar_date(year, month, day.parse().ok()?).ok()
}

/// Whole days from `today` until `date`; `None` once it has passed.
pub fn days_until_duty(date: Date, today: Date) -> Option<i64> {
    let days = (date - today).whole_days();
    (days >= 0).then_some(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_parse_duty_date_layouts() {
        for (raw, expected) in [
            ("2026-01-15", date!(2026 - 01 - 15)),
            ("2026/01/15", date!(2026 - 01 - 15)),
            ("15.01.2026", date!(2026 - 01 - 15)),
            ("15/01/2026", date!(2026 - 01 - 15)),
            ("15-01-2026", date!(2026 - 01 - 15)),
            ("15.01.26", date!(2026 - 01 - 15)),
            ("15/01/26", date!(2026 - 01 - 15)),
            ("01/15/2026", date!(2026 - 01 - 15)),
            ("2026-01-15 00:00:00", date!(2026 - 01 - 15)),
            ("2026-01-15T09:00:00Z", date!(2026 - 01 - 15)),
            (" 5.3.2026 ", date!(2026 - 03 - 05)),
        ] {
            assert_eq!(parse_duty_date(raw).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn test_parse_duty_date_day_first_wins() {
        // Both readings are valid; the roster is day-first.
        assert_eq!(parse_duty_date("03/04/2026").unwrap(), date!(2026 - 04 - 03));
        assert_eq!(parse_duty_date("01.02.99").unwrap(), date!(1999 - 02 - 01));
    }

    #[test]
    fn test_parse_duty_date_rejects_garbage() {
        for raw in [
            "",
            "tomorrow",
            "2026-02-30",
            "31.02.2026",
            "15.13.2026",
            "13.15.2026",
            "2026-01",
            "15.01.206",
            "aa.bb.cccc",
        ] {
            assert!(parse_duty_date(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_entry_requires_date_and_name() {
        let entry = DutyEntry::from_fields(
            Some("04.03.2026"),
            Some("  Ayse Kaya "),
            Some("+90 555 000 00 00"),
            Some(""),
            None,
        )
        .unwrap();
        assert_eq!(entry.duty_date, date!(2026 - 03 - 04));
        assert_eq!(entry.name, "Ayse Kaya");
        assert_eq!(entry.phone.as_deref(), Some("+90 555 000 00 00"));
        assert_eq!(entry.email, None);

        assert!(DutyEntry::from_fields(None, Some("A"), None, None, None).is_err());
        assert!(DutyEntry::from_fields(Some("2026-03-04"), Some(" "), None, None, None).is_err());
    }

    #[test]
    fn test_days_until_duty() {
        let today = date!(2026 - 03 - 04);
        assert_eq!(days_until_duty(today, today), Some(0));
        assert_eq!(days_until_duty(date!(2026 - 03 - 07), today), Some(3));
        assert_eq!(days_until_duty(date!(2026 - 03 - 01), today), None);
    }
}
