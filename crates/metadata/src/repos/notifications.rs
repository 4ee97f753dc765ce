//! Alert notification repository.

use crate::error::MetadataResult;
use crate::models::{ClaimOutcome, NotificationRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for notification claims and the delivery log.
#[async_trait]
pub trait NotificationRepo: Send + Sync {
    /// Claim the `(certificate_id, tier, cycle_key)` slot.
    ///
    /// Succeeds when the slot is free or its previous attempt failed. A slot
    /// that is pending or sent is never claimed twice.
    async fn claim_notification(&self, claim: &NotificationRow) -> MetadataResult<ClaimOutcome>;

    /// Whether a pending or sent notification for the pair exists since `since`.
    async fn has_recent_notification(
        &self,
        certificate_id: Uuid,
        tier: &str,
        since: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Mark a claimed notification as delivered.
    async fn mark_notification_sent(
        &self,
        notification_id: Uuid,
        sent_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Mark a claimed notification as failed so a later run may retry it.
    async fn mark_notification_failed(
        &self,
        notification_id: Uuid,
        error_message: &str,
    ) -> MetadataResult<()>;

    /// Delivery log for one certificate, newest first.
    async fn list_notifications_for_certificate(
        &self,
        certificate_id: Uuid,
    ) -> MetadataResult<Vec<NotificationRow>>;

    /// Notifications created since `since`, newest first.
    async fn list_notifications_since(
        &self,
        since: OffsetDateTime,
    ) -> MetadataResult<Vec<NotificationRow>>;
}

/// Notification delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    Pending,
    Sent,
    Failed,
}

impl NotificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}
