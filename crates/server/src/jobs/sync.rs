//! Certificate sync: fetch every source, normalize, upsert by natural key.

use crate::metrics;
use portall_core::{CertificateRecord, normalize};
use portall_metadata::MetadataStore;
use portall_metadata::models::UpsertOutcome;
use portall_metadata::repos::CertificateRepo;
use portall_sources::CertificateSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;

/// Per-source counters for one sync run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub malformed: u64,
    /// Stored, but flagged invalid and excluded from alerting.
    pub invalid_expiry: u64,
    /// Dropped by the environment or server filter.
    pub filtered: u64,
    /// Records the metadata store refused.
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Set when the source could not be read at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn absorb(&mut self, other: &SourceReport) {
        self.fetched += other.fetched;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.malformed += other.malformed;
        self.invalid_expiry += other.invalid_expiry;
        self.filtered += other.filtered;
        self.errors += other.errors;
    }
}

/// Summary of a sync run, stored as the job's stats.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunStats {
    pub dry_run: bool,
    pub sources: BTreeMap<String, SourceReport>,
    pub totals: SourceReport,
}

impl SyncRunStats {
    /// Sources that could not be read.
    pub fn failed_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, r)| r.error.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// True when at least one source ran and every one of them failed.
    pub fn all_failed(&self) -> bool {
        !self.sources.is_empty() && self.failed_sources().len() == self.sources.len()
    }
}

/// Post-normalization filters.
#[derive(Debug, Default, Clone)]
pub struct SyncFilters {
    /// Exact environment match (case-insensitive).
    pub environment: Option<String>,
    /// Hostname substring match (case-insensitive).
    pub server: Option<String>,
}

impl SyncFilters {
    pub fn matches(&self, record: &CertificateRecord) -> bool {
        if let Some(env) = &self.environment
            && !record
                .environment
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(env))
        {
            return false;
        }
        if let Some(server) = &self.server {
            let needle = server.to_ascii_lowercase();
            if !record
                .server_hostname
                .as_deref()
                .is_some_and(|h| h.contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

/// Run one sync over `sources`.
///
/// A source that fails to fetch is recorded in its report and the remaining
/// sources still run. In dry-run mode nothing is written; outcomes are
/// predicted from the stored rows.
pub async fn run_certificate_sync(
    metadata: &dyn MetadataStore,
    sources: &[Arc<dyn CertificateSource>],
    filters: &SyncFilters,
    dry_run: bool,
    now: OffsetDateTime,
) -> SyncRunStats {
    let mut stats = SyncRunStats {
        dry_run,
        ..Default::default()
    };

    for source in sources {
        let name = source.source().as_str();
        let report = sync_source(metadata, source.as_ref(), filters, dry_run, now).await;

        if let Some(error) = &report.error {
            metrics::SYNC_SOURCE_FAILURES.with_label_values(&[name]).inc();
            tracing::warn!(source = name, error = %error, "Certificate source failed");
        } else {
            tracing::info!(
                source = name,
                fetched = report.fetched,
                created = report.created,
                updated = report.updated,
                unchanged = report.unchanged,
                malformed = report.malformed,
                invalid_expiry = report.invalid_expiry,
                dry_run,
                "Certificate source synced"
            );
        }
        if !dry_run {
            metrics::record_sync(name, "created", report.created);
            metrics::record_sync(name, "updated", report.updated);
            metrics::record_sync(name, "unchanged", report.unchanged);
            metrics::record_sync(name, "malformed", report.malformed);
        }

        stats.totals.absorb(&report);
        stats.sources.insert(name.to_string(), report);
    }

    stats
}

async fn sync_source(
    metadata: &dyn MetadataStore,
    source: &dyn CertificateSource,
    filters: &SyncFilters,
    dry_run: bool,
    now: OffsetDateTime,
) -> SourceReport {
    let mut report = SourceReport::default();
    let kind = source.source();

    let batch = match source.fetch().await {
        Ok(batch) => batch,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };

    report.fetched = batch.rows.len() as u64 + batch.malformed;
    report.malformed = batch.malformed;
    report.warnings = batch.warnings;

    for raw in batch.rows {
        let record = match normalize(raw, kind, now) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(source = kind.as_str(), error = %e, "Skipping malformed record");
                report.malformed += 1;
                continue;
            }
        };
        if !filters.matches(&record) {
            report.filtered += 1;
            continue;
        }
        if record.is_invalid() {
            tracing::warn!(
                source = kind.as_str(),
                cert_key = %record.cert_key,
                reason = record.expiry_error.as_deref().unwrap_or_default(),
                "Certificate has no usable expiry"
            );
            report.invalid_expiry += 1;
        }

        let outcome = if dry_run {
            metadata
                .get_certificate_by_key(&record.cert_key)
                .await
                .map(|existing| match existing {
                    None => Prediction::Create,
                    Some(row) if row.matches_record(&record) => Prediction::Unchanged,
                    Some(_) => Prediction::Update,
                })
        } else {
            metadata
                .upsert_certificate(&record, now)
                .await
                .map(|outcome| match outcome {
                    UpsertOutcome::Created(_) => Prediction::Create,
                    UpsertOutcome::Updated(_) => Prediction::Update,
                    UpsertOutcome::Unchanged(_) => Prediction::Unchanged,
                })
        };

        match outcome {
            Ok(Prediction::Create) => report.created += 1,
            Ok(Prediction::Update) => report.updated += 1,
            Ok(Prediction::Unchanged) => report.unchanged += 1,
            Err(e) => {
                tracing::error!(
                    source = kind.as_str(),
                    cert_key = %record.cert_key,
                    error = %e,
                    "Failed to store certificate"
                );
                report.errors += 1;
            }
        }
    }

    report
}

enum Prediction {
    Create,
    Update,
    Unchanged,
}
