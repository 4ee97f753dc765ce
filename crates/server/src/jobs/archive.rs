//! Archive published announcements past their expiry.

use anyhow::Context;
use portall_metadata::models::ContentTable;
use portall_metadata::repos::{AnnouncementRepo, ContentRepo};
use portall_metadata::{MetadataError, MetadataStore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRunStats {
    pub candidates: u64,
    pub archived: u64,
    /// Changed or removed by someone else since the listing.
    pub skipped: u64,
    pub errors: u64,
    pub dry_run: bool,
}

pub async fn run_announcement_archive(
    metadata: &dyn MetadataStore,
    dry_run: bool,
    now: OffsetDateTime,
) -> anyhow::Result<ArchiveRunStats> {
    let expired = metadata
        .list_expired_announcements(now)
        .await
        .context("failed to list expired announcements")?;

    let mut stats = ArchiveRunStats {
        candidates: expired.len() as u64,
        dry_run,
        ..Default::default()
    };
    if dry_run {
        return Ok(stats);
    }

    for announcement in expired {
        match metadata
            .transition_status(
                ContentTable::Announcements,
                announcement.announcement_id,
                "published",
                "archived",
                now,
            )
            .await
        {
            Ok(()) => {
                tracing::info!(
                    announcement_id = %announcement.announcement_id,
                    slug = %announcement.slug,
                    "Announcement archived"
                );
                stats.archived += 1;
            }
            Err(MetadataError::NotFound(_) | MetadataError::InvalidStateTransition { .. }) => {
                stats.skipped += 1;
            }
            Err(e) => {
                tracing::error!(
                    announcement_id = %announcement.announcement_id,
                    error = %e,
                    "Failed to archive announcement"
                );
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}
