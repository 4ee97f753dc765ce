//! On-call roster repository.

use crate::error::MetadataResult;
use crate::models::{DutyRow, DutyUpsert};
use async_trait::async_trait;
use portall_core::DutyEntry;
use time::{Date, OffsetDateTime};

/// Repository for the daily on-call roster. Only the duty sync job writes here.
#[async_trait]
pub trait DutyRepo: Send + Sync {
    /// Insert or update the entry for its date. The last writer wins.
    async fn upsert_duty(
        &self,
        entry: &DutyEntry,
        source: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<DutyUpsert>;

    /// The entry for one date.
    async fn get_duty(&self, duty_date: Date) -> MetadataResult<Option<DutyRow>>;

    /// The first entry strictly after `duty_date`.
    async fn next_duty_after(&self, duty_date: Date) -> MetadataResult<Option<DutyRow>>;

    /// Entries in `[from, to]`, oldest first.
    async fn list_duties(&self, from: Date, to: Date) -> MetadataResult<Vec<DutyRow>>;

    /// Delete entries before `duty_date`. Returns how many went.
    async fn delete_duties_before(&self, duty_date: Date) -> MetadataResult<u64>;
}
