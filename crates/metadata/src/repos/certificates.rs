//! Certificate repository.

use crate::error::MetadataResult;
use crate::models::{CertificateFilter, CertificateRow, CertificateStats, UpsertOutcome};
use async_trait::async_trait;
use portall_core::CertificateRecord;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for certificate records. Only sync jobs write here.
#[async_trait]
pub trait CertificateRepo: Send + Sync {
    /// Insert or update by natural key. Descriptive fields are overwritten by
    /// the latest writer; `certificate_id` and `created_at` are kept. A row
    /// whose fields already match only has `last_synced_at` and `source`
    /// refreshed and reports `Unchanged`.
    async fn upsert_certificate(
        &self,
        record: &CertificateRecord,
        now: OffsetDateTime,
    ) -> MetadataResult<UpsertOutcome>;

    /// Get a certificate by ID.
    async fn get_certificate(&self, certificate_id: Uuid) -> MetadataResult<Option<CertificateRow>>;

    /// Get a certificate by natural key.
    async fn get_certificate_by_key(&self, cert_key: &str)
    -> MetadataResult<Option<CertificateRow>>;

    /// List certificates ordered by expiry (invalid rows last).
    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> MetadataResult<Vec<CertificateRow>>;

    /// Active, monitored certificates for the alert evaluator.
    async fn list_alertable_certificates(&self) -> MetadataResult<Vec<CertificateRow>>;

    /// Counters over active certificates.
    async fn certificate_stats(&self, now: OffsetDateTime) -> MetadataResult<CertificateStats>;
}
