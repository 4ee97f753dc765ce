//! Background job repository.

use crate::error::MetadataResult;
use crate::models::JobRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for background job runs.
#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Create a job.
    ///
    /// At most one job per type may be queued or running. A second active job
    /// is rejected with `MetadataError::Constraint`.
    async fn create_job(&self, job: &JobRow) -> MetadataResult<()>;

    /// Get a job by ID.
    async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>>;

    /// Update job state, stats and error.
    async fn update_job_state(
        &self,
        job_id: Uuid,
        state: &str,
        finished_at: Option<OffsetDateTime>,
        stats_json: Option<&str>,
        error: Option<&str>,
    ) -> MetadataResult<()>;

    /// Recent jobs, newest first, optionally restricted to one type.
    async fn list_recent_jobs(
        &self,
        job_type: Option<&str>,
        limit: u32,
    ) -> MetadataResult<Vec<JobRow>>;

    /// Queued or running jobs of a type.
    async fn get_active_jobs(&self, job_type: &str) -> MetadataResult<Vec<JobRow>>;

    /// Every queued or running job. Used for recovery after a restart.
    async fn get_orphaned_jobs(&self) -> MetadataResult<Vec<JobRow>>;

    /// Most recent successfully finished job of a type, ignoring dry runs.
    async fn last_finished_job(&self, job_type: &str) -> MetadataResult<Option<JobRow>>;
}

/// Background job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    /// Pull certificates from every configured source.
    CertificateSync,
    /// Evaluate expiry tiers and send alerts.
    CertificateAlerts,
    /// Archive published announcements past their expiry.
    AnnouncementArchive,
    /// Mail the weekly certificate report.
    WeeklyReport,
    /// Import the on-call roster feed.
    DutySync,
    /// Mail today's and the next on-call duty.
    DutyNotification,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        Self::CertificateSync,
        Self::CertificateAlerts,
        Self::AnnouncementArchive,
        Self::WeeklyReport,
        Self::DutySync,
        Self::DutyNotification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CertificateSync => "certificate_sync",
            Self::CertificateAlerts => "certificate_alerts",
            Self::AnnouncementArchive => "announcement_archive",
            Self::WeeklyReport => "weekly_report",
            Self::DutySync => "duty_sync",
            Self::DutyNotification => "duty_notification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

/// What started a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTrigger {
    Schedule,
    Manual,
}

impl JobTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Manual => "manual",
        }
    }
}
