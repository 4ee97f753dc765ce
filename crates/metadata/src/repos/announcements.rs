//! Announcement repository.

use crate::error::MetadataResult;
use crate::models::{AnnouncementFilter, AnnouncementRow};
use async_trait::async_trait;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for announcements.
#[async_trait]
pub trait AnnouncementRepo: Send + Sync {
    /// Create an announcement. Duplicate slugs are rejected with `AlreadyExists`.
    async fn create_announcement(&self, announcement: &AnnouncementRow) -> MetadataResult<()>;

    /// Get an announcement by ID.
    async fn get_announcement(&self, announcement_id: Uuid)
    -> MetadataResult<Option<AnnouncementRow>>;

    /// Get an announcement by slug.
    async fn get_announcement_by_slug(&self, slug: &str)
    -> MetadataResult<Option<AnnouncementRow>>;

    /// Whether a slug is taken.
    async fn slug_exists(&self, slug: &str) -> MetadataResult<bool>;

    /// Update editable fields. Status and timestamps other than `updated_at`
    /// are left untouched.
    async fn update_announcement(&self, announcement: &AnnouncementRow) -> MetadataResult<()>;

    /// Delete an announcement.
    async fn delete_announcement(&self, announcement_id: Uuid) -> MetadataResult<()>;

    /// List announcements, pinned first, then newest.
    async fn list_announcements(
        &self,
        filter: &AnnouncementFilter,
    ) -> MetadataResult<Vec<AnnouncementRow>>;

    /// Published announcements whose `expires_at` is before `now`.
    async fn list_expired_announcements(
        &self,
        now: OffsetDateTime,
    ) -> MetadataResult<Vec<AnnouncementRow>>;

    /// Number of announcements per status.
    async fn announcement_counts(&self) -> MetadataResult<BTreeMap<String, u64>>;
}
