//! Expiry alert tiers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use time::UtcOffset;
use time::macros::format_description;

/// Default thresholds in days.
pub const DEFAULT_THRESHOLDS: [u32; 6] = [90, 60, 30, 15, 7, 1];

/// Alert tier reached by a certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AlertTier {
    /// Expires within `days` calendar days.
    Expiring { days: u32 },
    /// Already past `valid_to`.
    Expired,
}

impl AlertTier {
    /// Parse the tier label (`30_days`, `1_day`, `expired`).
    pub fn parse(s: &str) -> Result<Self> {
        if s == "expired" {
            return Ok(Self::Expired);
        }
        let days = s
            .strip_suffix("_days")
            .or_else(|| s.strip_suffix("_day"))
            .and_then(|d| d.parse::<u32>().ok())
            .ok_or_else(|| Error::validation("tier", format!("unknown alert tier: {s}")))?;
        Ok(Self::Expiring { days })
    }

    /// Stable label stored in the notification log.
    pub fn label(&self) -> String {
        match self {
            Self::Expired => "expired".to_string(),
            Self::Expiring { days: 1 } => "1_day".to_string(),
            Self::Expiring { days } => format!("{days}_days"),
        }
    }

    /// Human readable name for mail subjects.
    pub fn display_name(&self) -> String {
        match self {
            Self::Expired => "Expired".to_string(),
            Self::Expiring { days: 0 } => "Expires today".to_string(),
            Self::Expiring { days: 1 } => "1 day before expiry".to_string(),
            Self::Expiring { days } => format!("{days} days before expiry"),
        }
    }

    /// Lower value means more urgent.
    pub fn urgency(&self) -> i64 {
        match self {
            Self::Expired => -1,
            Self::Expiring { days } => i64::from(*days),
        }
    }
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<AlertTier> for String {
    fn from(tier: AlertTier) -> Self {
        tier.label()
    }
}

impl TryFrom<String> for AlertTier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

/// Outcome of evaluating one certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// No usable expiry; excluded from alerting.
    Invalid,
    /// Expiry is further away than every threshold.
    NoTier,
    /// A tier was reached.
    Due(AlertTier),
}

/// Configured thresholds, kept sorted ascending and deduplicated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertThresholds(Vec<u32>);

impl AlertThresholds {
    /// Build from configured day counts.
    pub fn new(mut days: Vec<u32>) -> Result<Self> {
        if days.is_empty() {
            return Err(Error::validation(
                "alerts.thresholds_days",
                "at least one threshold is required",
            ));
        }
        days.sort_unstable();
        days.dedup();
        Ok(Self(days))
    }

    /// Thresholds in ascending order.
    pub fn days(&self) -> &[u32] {
        &self.0
    }

    /// Every tier an alert can be raised for, most urgent first.
    pub fn tiers(&self) -> Vec<AlertTier> {
        std::iter::once(AlertTier::Expired)
            .chain(self.0.iter().map(|&days| AlertTier::Expiring { days }))
            .collect()
    }

    /// Pick the tier for a certificate expiring at `valid_to`.
    ///
    /// The tier is the smallest threshold that the remaining calendar days
    /// fall within, so a certificate 5 days out with thresholds 30/15/7 lands
    /// in the 7-day tier.
    pub fn tier_for(&self, valid_to: OffsetDateTime, now: OffsetDateTime) -> Option<AlertTier> {
        if now > valid_to {
            return Some(AlertTier::Expired);
        }
        let days_left = days_until(valid_to, now);
        self.0
            .iter()
            .find(|&&threshold| days_left <= i64::from(threshold))
            .map(|&days| AlertTier::Expiring { days })
    }

    /// Evaluate a certificate expiry.
    pub fn evaluate(&self, valid_to: Option<OffsetDateTime>, now: OffsetDateTime) -> Evaluation {
        match valid_to {
            None => Evaluation::Invalid,
            Some(valid_to) => match self.tier_for(valid_to, now) {
                Some(tier) => Evaluation::Due(tier),
                None => Evaluation::NoTier,
            },
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        let mut days = DEFAULT_THRESHOLDS.to_vec();
        days.sort_unstable();
        Self(days)
    }
}

/// Calendar days between `now` and `valid_to`, both taken in UTC.
pub fn days_until(valid_to: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let expiry_date = valid_to.to_offset(UtcOffset::UTC).date();
    let today = now.to_offset(UtcOffset::UTC).date();
    (expiry_date - today).whole_days()
}

/// How a re-run decides that a (certificate, tier) pair was already notified.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupWindow {
    /// One notification per tier per UTC calendar day.
    #[default]
    #[serde(rename = "calendar_day")]
    CalendarDay,
    /// One notification per tier within any 24 hour span.
    #[serde(rename = "rolling_24h")]
    Rolling24h,
}

impl DedupWindow {
    /// Key that scopes a notification claim.
    ///
    /// Calendar-day claims collide on the date. Rolling claims are keyed by
    /// the run instant and deduplicated by looking back 24 hours instead.
    pub fn cycle_key(&self, now: OffsetDateTime) -> String {
        let now = now.to_offset(UtcOffset::UTC);
        match self {
            Self::CalendarDay => now
                .date()
                .format(format_description!("[year]-[month]-[day]"))
                .unwrap_or_else(|_| now.date().to_string()),
            Self::Rolling24h => format!("rolling:{}", now.unix_timestamp()),
        }
    }

    /// Look-back for rolling deduplication.
    pub fn lookback(&self) -> Option<time::Duration> {
        match self {
            Self::CalendarDay => None,
            Self::Rolling24h => Some(time::Duration::hours(24)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CalendarDay => "calendar_day",
            Self::Rolling24h => "rolling_24h",
        }
    }
}
