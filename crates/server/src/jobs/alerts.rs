//! Expiry alerts: evaluate tiers, claim, then mail.

use crate::metrics;
use anyhow::Context;
use portall_core::config::AlertsConfig;
use portall_core::{AlertTier, Evaluation, days_until};
use portall_metadata::MetadataStore;
use portall_metadata::models::{CertificateRow, ClaimOutcome, NotificationRow};
use portall_metadata::repos::{CertificateRepo, NotificationRepo, NotificationState};
use portall_notify::{Email, Mailer, render};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

/// Summary of an alert run, stored as the job's stats.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRunStats {
    pub evaluated: u64,
    /// No usable expiry; excluded.
    pub invalid: u64,
    pub no_tier: u64,
    pub already_notified: u64,
    /// Delivered, or in dry-run mode, would be delivered.
    pub sent: u64,
    pub errors: u64,
    pub dry_run: bool,
}

/// Evaluate every alertable certificate and notify the due ones.
///
/// Each (certificate, tier, cycle) is claimed in the store before the mail
/// goes out, so re-running within a cycle never sends twice. A failed send
/// leaves the claim `failed` for a later run to retry. Per-certificate errors
/// are counted and the run continues.
pub async fn run_certificate_alerts(
    metadata: &dyn MetadataStore,
    mailer: &dyn Mailer,
    config: &AlertsConfig,
    dry_run: bool,
    now: OffsetDateTime,
) -> anyhow::Result<AlertRunStats> {
    let thresholds = config.thresholds().context("invalid alert thresholds")?;
    let certificates = metadata
        .list_alertable_certificates()
        .await
        .context("failed to list certificates")?;

    let mut stats = AlertRunStats {
        dry_run,
        ..Default::default()
    };

    for cert in &certificates {
        stats.evaluated += 1;
        let tier = match thresholds.evaluate(cert.valid_to, now) {
            Evaluation::Invalid => {
                stats.invalid += 1;
                continue;
            }
            Evaluation::NoTier => {
                stats.no_tier += 1;
                continue;
            }
            Evaluation::Due(tier) => tier,
        };

        match notify(metadata, mailer, config, cert, tier, dry_run, now).await {
            Ok(Delivery::Sent) => stats.sent += 1,
            Ok(Delivery::AlreadyNotified) => stats.already_notified += 1,
            Err(e) => {
                tracing::warn!(
                    certificate_id = %cert.certificate_id,
                    common_name = %cert.common_name,
                    tier = %tier,
                    error = %format!("{e:#}"),
                    "Alert not delivered"
                );
                stats.errors += 1;
                if !dry_run {
                    metrics::ALERT_NOTIFICATIONS
                        .with_label_values(&["failed"])
                        .inc();
                }
            }
        }
    }

    tracing::info!(
        evaluated = stats.evaluated,
        invalid = stats.invalid,
        sent = stats.sent,
        already_notified = stats.already_notified,
        errors = stats.errors,
        dry_run,
        "Certificate alert run complete"
    );
    Ok(stats)
}

enum Delivery {
    Sent,
    AlreadyNotified,
}

async fn notify(
    metadata: &dyn MetadataStore,
    mailer: &dyn Mailer,
    config: &AlertsConfig,
    cert: &CertificateRow,
    tier: AlertTier,
    dry_run: bool,
    now: OffsetDateTime,
) -> anyhow::Result<Delivery> {
    let label = tier.label();
    let recipients = config.recipients_for(&label);
    if recipients.is_empty() {
        anyhow::bail!("no recipients configured for tier {label}");
    }

    // Rolling windows dedupe by look-back; calendar days by the claim key.
    let since = match config.dedup_window.lookback() {
        Some(lookback) => Some(now - lookback),
        None if dry_run => Some(now.to_offset(UtcOffset::UTC).replace_time(time::Time::MIDNIGHT)),
        None => None,
    };
    if let Some(since) = since
        && metadata
            .has_recent_notification(cert.certificate_id, &label, since)
            .await?
    {
        return Ok(Delivery::AlreadyNotified);
    }
    if dry_run {
        return Ok(Delivery::Sent);
    }

    let values = placeholders(cert, tier, now);
    let email = Email {
        to: recipients.to_vec(),
        subject: render(&config.subject_template, &values),
        body: render(&config.body_template, &values),
    };

    let claim = NotificationRow {
        notification_id: Uuid::new_v4(),
        certificate_id: cert.certificate_id,
        tier: label.clone(),
        cycle_key: config.dedup_window.cycle_key(now),
        recipients: email.to.join(", "),
        subject: email.subject.clone(),
        state: NotificationState::Pending.as_str().to_string(),
        error_message: None,
        created_at: now,
        sent_at: None,
    };
    let notification_id = match metadata.claim_notification(&claim).await? {
        ClaimOutcome::Claimed(id) => id,
        ClaimOutcome::AlreadyClaimed => return Ok(Delivery::AlreadyNotified),
    };

    match mailer.send(&email).await {
        Ok(()) => {
            metadata
                .mark_notification_sent(notification_id, OffsetDateTime::now_utc())
                .await?;
            metrics::ALERT_NOTIFICATIONS
                .with_label_values(&["sent"])
                .inc();
            tracing::info!(
                certificate_id = %cert.certificate_id,
                common_name = %cert.common_name,
                tier = %label,
                "Expiry alert sent"
            );
            Ok(Delivery::Sent)
        }
        Err(e) => {
            metadata
                .mark_notification_failed(notification_id, &e.to_string())
                .await?;
            Err(anyhow::Error::new(e).context("mail delivery failed"))
        }
    }
}

/// Template values for one certificate.
pub fn placeholders(
    cert: &CertificateRow,
    tier: AlertTier,
    now: OffsetDateTime,
) -> BTreeMap<&'static str, String> {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let valid_to = cert
        .valid_to
        .and_then(|t| {
            t.to_offset(UtcOffset::UTC)
                .format(format_description!("[year]-[month]-[day] [hour]:[minute] UTC"))
                .ok()
        })
        .unwrap_or_else(|| "-".to_string());
    let days = cert
        .valid_to
        .map(|t| days_until(t, now).to_string())
        .unwrap_or_else(|| "-".to_string());

    BTreeMap::from([
        ("alert_type", tier.display_name()),
        ("common_name", cert.common_name.clone()),
        ("valid_to", valid_to),
        ("certificate_type", cert.kind.to_ascii_uppercase()),
        ("serial_number", or_dash(&cert.serial_number)),
        ("server_hostname", or_dash(&cert.server_hostname)),
        ("application_name", or_dash(&cert.application_name)),
        ("environment", or_dash(&cert.environment)),
        ("days_until_expiry", days),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use portall_core::{CertificateKind, RawCertificate, SyncSource, normalize};
    use time::macros::datetime;

    #[test]
    fn test_placeholders() {
        let now = datetime!(2026-03-01 10:00 UTC);
        let raw = RawCertificate {
            kind: CertificateKind::Java,
            alias: Some("tomcat".to_string()),
            common_name: Some("api.example.com".to_string()),
            server_hostname: Some("APP01".to_string()),
            valid_to: Some("2026-03-08T09:00:00Z".to_string()),
            ..Default::default()
        };
        let record = normalize(raw, SyncSource::Ssh, now).unwrap();
        let row = CertificateRow::from_record(&record, now);

        let values = placeholders(&row, AlertTier::Expiring { days: 7 }, now);
        assert_eq!(values["common_name"], "api.example.com");
        assert_eq!(values["certificate_type"], "JAVA");
        assert_eq!(values["valid_to"], "2026-03-08 09:00 UTC");
        assert_eq!(values["days_until_expiry"], "7");
        assert_eq!(values["serial_number"], "-");
        assert_eq!(values["server_hostname"], "app01");
        assert_eq!(values["alert_type"], "7 days before expiry");
    }
}
