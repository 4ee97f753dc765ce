//! On-call roster import and the daily duty notice.

use anyhow::{Context, bail};
use portall_core::config::DutyConfig;
use portall_core::days_until_duty;
use portall_metadata::MetadataStore;
use portall_metadata::models::{DutyRow, DutyUpsert};
use portall_metadata::repos::DutyRepo;
use portall_notify::{Email, Mailer};
use portall_sources::DutyRosterSource;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use time::macros::{date, format_description};
use time::{Date, Duration, OffsetDateTime};

/// Earlier than any roster entry; inside every backend's date range.
const ROSTER_EPOCH: Date = date!(1900 - 01 - 01);

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutySyncStats {
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Feed rows without a usable date or name.
    pub rejected: u64,
    /// Entries past the retention window.
    pub pruned: u64,
    pub dry_run: bool,
}

/// Import the roster feed, then prune entries older than `retention_days`.
///
/// A dry run classifies each entry against the stored roster and counts what
/// would be pruned without writing.
pub async fn run_duty_sync(
    metadata: &dyn MetadataStore,
    source: Option<&dyn DutyRosterSource>,
    config: &DutyConfig,
    dry_run: bool,
    now: OffsetDateTime,
) -> anyhow::Result<DutySyncStats> {
    let Some(source) = source else {
        bail!("no duty roster feed configured (duty.source)");
    };
    let origin = source.describe();
    let batch = source
        .fetch()
        .await
        .with_context(|| format!("failed to fetch duty roster from {origin}"))?;

    let mut stats = DutySyncStats {
        fetched: batch.entries.len() as u64,
        rejected: batch.rejected,
        dry_run,
        ..Default::default()
    };
    if batch.rejected > 0 {
        tracing::warn!(rejected = batch.rejected, source = %origin, "Duty roster rows rejected");
    }

    for entry in &batch.entries {
        let outcome = if dry_run {
            match metadata.get_duty(entry.duty_date).await? {
                None => DutyUpsert::Created,
                Some(row) if row.matches_entry(entry) => DutyUpsert::Unchanged,
                Some(_) => DutyUpsert::Updated,
            }
        } else {
            metadata
                .upsert_duty(entry, &origin, now)
                .await
                .with_context(|| format!("failed to store duty for {}", entry.duty_date))?
        };
        match outcome {
            DutyUpsert::Created => stats.created += 1,
            DutyUpsert::Updated => stats.updated += 1,
            DutyUpsert::Unchanged => stats.unchanged += 1,
        }
    }

    let cutoff = now.date() - Duration::days(i64::from(config.retention_days));
    stats.pruned = if dry_run {
        match cutoff.previous_day() {
            Some(last) => metadata.list_duties(ROSTER_EPOCH, last).await?.len() as u64,
            None => 0,
        }
    } else {
        metadata
            .delete_duties_before(cutoff)
            .await
            .context("failed to prune old duty entries")?
    };

    tracing::info!(
        fetched = stats.fetched,
        created = stats.created,
        updated = stats.updated,
        unchanged = stats.unchanged,
        rejected = stats.rejected,
        pruned = stats.pruned,
        dry_run,
        "Duty roster synced"
    );
    Ok(stats)
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyNotificationStats {
    pub current: Option<String>,
    pub next: Option<String>,
    pub recipients: Vec<String>,
    pub sent: bool,
    pub dry_run: bool,
}

/// Mail who is on duty today and who is next.
///
/// Nothing is sent when the roster has neither.
pub async fn run_duty_notification(
    metadata: &dyn MetadataStore,
    mailer: &dyn Mailer,
    config: &DutyConfig,
    dry_run: bool,
    now: OffsetDateTime,
) -> anyhow::Result<DutyNotificationStats> {
    if config.recipients.is_empty() {
        bail!("no duty recipients configured (duty.recipients)");
    }

    let today = now.date();
    let current = metadata.get_duty(today).await?;
    let next = metadata.next_duty_after(today).await?;

    let mut stats = DutyNotificationStats {
        current: current.as_ref().map(|d| d.name.clone()),
        next: next.as_ref().map(|d| d.name.clone()),
        recipients: config.recipients.clone(),
        sent: false,
        dry_run,
    };
    if current.is_none() && next.is_none() {
        tracing::info!(%today, "No duty on the roster; notice skipped");
        return Ok(stats);
    }

    if !dry_run {
        let email = Email {
            to: stats.recipients.clone(),
            subject: format!("On-call duty for {}", display_date(today)),
            body: render_notice(today, current.as_ref(), next.as_ref()),
        };
        mailer
            .send(&email)
            .await
            .context("failed to send duty notice")?;
        stats.sent = true;
        tracing::info!(recipients = stats.recipients.len(), "Duty notice sent");
    }
    Ok(stats)
}

fn display_date(date: Date) -> String {
    date.format(format_description!("[day].[month].[year]"))
        .unwrap_or_else(|_| date.to_string())
}

fn duty_lines(out: &mut String, duty: &DutyRow) {
    let _ = writeln!(out, "  {}", duty.name);
    for (label, value) in [
        ("phone", &duty.phone),
        ("email", &duty.email),
        ("notes", &duty.notes),
    ] {
        if let Some(value) = value {
            let _ = writeln!(out, "  {label}: {value}");
        }
    }
}

/// Plain-text duty notice.
pub fn render_notice(today: Date, current: Option<&DutyRow>, next: Option<&DutyRow>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "On duty today ({})", display_date(today));
    match current {
        Some(duty) => duty_lines(&mut out, duty),
        None => {
            let _ = writeln!(out, "  nobody is on the roster");
        }
    }
    if let Some(duty) = next {
        let _ = writeln!(out);
        let days = days_until_duty(duty.duty_date, today).unwrap_or_default();
        let _ = writeln!(
            out,
            "Next duty: {} (in {days} days)",
            display_date(duty.duty_date)
        );
        duty_lines(&mut out, duty);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row(duty_date: Date, name: &str, phone: Option<&str>) -> DutyRow {
        let at = datetime!(2026-03-01 06:00 UTC);
        DutyRow {
            duty_date,
            name: name.to_string(),
            phone: phone.map(str::to_string),
            email: None,
            notes: None,
            source: "https://roster.example.com/duty.csv".to_string(),
            synced_at: at,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_render_notice() {
        let today = date!(2026 - 03 - 04);
        let current = row(today, "Ayse Kaya", Some("100"));
        let next = row(date!(2026 - 03 - 07), "Ali Demir", None);

        let body = render_notice(today, Some(&current), Some(&next));
        assert!(body.starts_with("On duty today (04.03.2026)\n  Ayse Kaya\n  phone: 100\n"));
        assert!(body.contains("Next duty: 07.03.2026 (in 3 days)\n  Ali Demir\n"));
        assert!(!body.contains("email:"));

        let body = render_notice(today, None, Some(&next));
        assert!(body.contains("nobody is on the roster"));
    }
}
