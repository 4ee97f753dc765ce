//! Weekly certificate summary mail.

use anyhow::{Context, bail};
use portall_core::config::AppConfig;
use portall_metadata::MetadataStore;
use portall_metadata::models::{CertificateStats, KindStats};
use portall_metadata::repos::{
    AnnouncementRepo, CertificateRepo, NotificationRepo, NotificationState,
};
use portall_notify::{Email, Mailer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub certificates: CertificateStats,
    pub notifications_sent_7d: u64,
    pub announcements: BTreeMap<String, u64>,
    pub recipients: Vec<String>,
    pub dry_run: bool,
}

/// Gather the weekly figures and mail them.
///
/// Recipients come from `report.recipients`, falling back to
/// `alerts.recipients`.
pub async fn run_weekly_report(
    metadata: &dyn MetadataStore,
    mailer: &dyn Mailer,
    config: &AppConfig,
    dry_run: bool,
    now: OffsetDateTime,
) -> anyhow::Result<ReportStats> {
    let recipients = if config.report.recipients.is_empty() {
        config.alerts.recipients.clone()
    } else {
        config.report.recipients.clone()
    };
    if recipients.is_empty() {
        bail!("no report recipients configured (report.recipients or alerts.recipients)");
    }

    let certificates = metadata
        .certificate_stats(now)
        .await
        .context("failed to compute certificate stats")?;
    let notifications_sent_7d = metadata
        .list_notifications_since(now - Duration::days(7))
        .await
        .context("failed to list notifications")?
        .iter()
        .filter(|n| n.state == NotificationState::Sent.as_str())
        .count() as u64;
    let announcements = metadata
        .announcement_counts()
        .await
        .context("failed to count announcements")?;

    let stats = ReportStats {
        certificates,
        notifications_sent_7d,
        announcements,
        recipients,
        dry_run,
    };

    if !dry_run {
        let email = Email {
            to: stats.recipients.clone(),
            subject: config.report.subject.clone(),
            body: render_report(&stats, now),
        };
        mailer
            .send(&email)
            .await
            .context("failed to send weekly report")?;
        tracing::info!(recipients = stats.recipients.len(), "Weekly report sent");
    }

    Ok(stats)
}

fn kind_line(out: &mut String, label: &str, stats: &KindStats) {
    let _ = writeln!(
        out,
        "{label}: total {}, valid {}, expiring within 30 days {}, expired {}, invalid {}",
        stats.total,
        stats.valid(),
        stats.expiring_30,
        stats.expired,
        stats.invalid
    );
}

/// Plain-text report body.
pub fn render_report(stats: &ReportStats, now: OffsetDateTime) -> String {
    let generated = now
        .to_offset(UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day] [hour]:[minute] UTC"))
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(out, "Portall weekly report, generated {generated}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Certificates");
    kind_line(&mut out, "  all", &stats.certificates.total);
    for (kind, kind_stats) in &stats.certificates.by_kind {
        kind_line(&mut out, &format!("  {kind}"), kind_stats);
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Alert notifications sent in the last 7 days: {}",
        stats.notifications_sent_7d
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Announcements");
    if stats.announcements.is_empty() {
        let _ = writeln!(out, "  none");
    }
    for (status, count) in &stats.announcements {
        let _ = writeln!(out, "  {status}: {count}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_render_report() {
        let kdb = KindStats {
            total: 10,
            expired: 1,
            expiring_30: 2,
            invalid: 1,
        };
        let stats = ReportStats {
            certificates: CertificateStats {
                total: kdb.clone(),
                by_kind: BTreeMap::from([("kdb".to_string(), kdb)]),
            },
            notifications_sent_7d: 4,
            announcements: BTreeMap::from([("published".to_string(), 3)]),
            recipients: vec!["ops@example.com".to_string()],
            dry_run: false,
        };

        let body = render_report(&stats, datetime!(2026-03-02 09:00 UTC));
        assert!(body.contains("generated 2026-03-02 09:00 UTC"));
        assert!(body.contains(
            "  kdb: total 10, valid 6, expiring within 30 days 2, expired 1, invalid 1"
        ));
        assert!(body.contains("last 7 days: 4"));
        assert!(body.contains("  published: 3"));
    }
}
