//! Background jobs.
//!
//! Every job is a single-shot tokio task recorded in the `jobs` table. The
//! store allows one queued or running job per type, so overlapping triggers
//! are rejected there rather than coordinated in memory.

pub mod alerts;
pub mod archive;
pub mod duty;
pub mod report;
pub mod sync;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use portall_metadata::models::JobRow;
use portall_metadata::repos::{JobRepo, JobState, JobTrigger, JobType};
use portall_metadata::{MetadataError, MetadataStore};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Per-trigger options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobOptions {
    /// Compute and report without writing or mailing.
    #[serde(default)]
    pub dry_run: bool,
    /// Ignore the minimum sync interval.
    #[serde(default)]
    pub force: bool,
    /// Sync only: environment filter, overriding the configured one.
    pub environment: Option<String>,
    /// Sync only: hostname substring filter, overriding the configured one.
    pub server: Option<String>,
}

/// What a finished job reports back.
struct JobOutcome {
    stats: serde_json::Value,
    /// Set when the run completed but should be recorded as failed.
    error: Option<String>,
}

impl JobOutcome {
    fn finished<T: serde::Serialize>(stats: &T) -> anyhow::Result<Self> {
        Ok(Self {
            stats: serde_json::to_value(stats)?,
            error: None,
        })
    }
}

/// Record and spawn a job.
///
/// Returns `Conflict` when a job of the same type is already active, or when
/// a certificate sync finished less than `sources.min_interval_secs` ago and
/// neither `force` nor `dry_run` is set.
pub async fn spawn_job(
    state: &AppState,
    job_type: JobType,
    trigger: JobTrigger,
    options: JobOptions,
) -> ApiResult<Uuid> {
    let now = OffsetDateTime::now_utc();

    if job_type == JobType::CertificateSync && !options.force && !options.dry_run {
        let min_secs = i64::try_from(state.config.sources.min_interval_secs).unwrap_or(i64::MAX);
        let min_interval = time::Duration::seconds(min_secs);
        if let Some(last) = state.metadata.last_finished_job(job_type.as_str()).await?
            && let Some(finished_at) = last.finished_at
            && now - finished_at < min_interval
        {
            return Err(ApiError::Conflict(format!(
                "certificate sync finished {}s ago; minimum interval is {}s (use force to override)",
                (now - finished_at).whole_seconds(),
                state.config.sources.min_interval_secs
            )));
        }
    }

    let job = JobRow {
        job_id: Uuid::new_v4(),
        job_type: job_type.as_str().to_string(),
        triggered_by: trigger.as_str().to_string(),
        state: JobState::Queued.as_str().to_string(),
        dry_run: options.dry_run,
        started_at: Some(now),
        finished_at: None,
        stats_json: None,
        error: None,
    };

    // The store enforces one active job per type atomically.
    if let Err(e) = state.metadata.create_job(&job).await {
        if matches!(e, MetadataError::Constraint(_)) {
            return Err(ApiError::Conflict(format!(
                "another {} job is already active",
                job_type.as_str()
            )));
        }
        return Err(e.into());
    }

    metrics::JOBS_ACTIVE.inc();
    tracing::info!(
        job_id = %job.job_id,
        job_type = job_type.as_str(),
        trigger = trigger.as_str(),
        dry_run = options.dry_run,
        "Job queued"
    );

    let job_id = job.job_id;
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        run_job(task_state, job_id, job_type, options).await;
    });
    state
        .job_registry
        .register(job_id, job_type.as_str(), handle)
        .await;

    Ok(job_id)
}

async fn run_job(state: AppState, job_id: Uuid, job_type: JobType, options: JobOptions) {
    let start = std::time::Instant::now();

    if let Err(e) = state
        .metadata
        .update_job_state(job_id, JobState::Running.as_str(), None, None, None)
        .await
    {
        tracing::error!(job_id = %job_id, error = %e, "Failed to mark job running");
    }

    let result = execute(&state, job_type, &options).await;

    let (final_state, stats_json, error) = match result {
        Ok(outcome) => {
            let stats_json = serde_json::to_string(&outcome.stats)
                .map_err(|e| {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to serialize job stats");
                    e
                })
                .ok();
            match outcome.error {
                Some(error) => {
                    tracing::warn!(job_id = %job_id, job_type = job_type.as_str(), %error, "Job failed");
                    (JobState::Failed, stats_json, Some(error))
                }
                None => (JobState::Finished, stats_json, None),
            }
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(job_id = %job_id, job_type = job_type.as_str(), %error, "Job failed");
            (JobState::Failed, None, Some(error))
        }
    };

    metrics::JOB_DURATION
        .with_label_values(&[job_type.as_str(), final_state.as_str()])
        .observe(start.elapsed().as_secs_f64());
    metrics::JOB_RUNS
        .with_label_values(&[job_type.as_str(), final_state.as_str()])
        .inc();
    metrics::JOBS_ACTIVE.dec();

    if let Err(e) = state
        .metadata
        .update_job_state(
            job_id,
            final_state.as_str(),
            Some(OffsetDateTime::now_utc()),
            stats_json.as_deref(),
            error.as_deref(),
        )
        .await
    {
        tracing::error!(job_id = %job_id, error = %e, "Failed to update job state");
    }
}

async fn execute(
    state: &AppState,
    job_type: JobType,
    options: &JobOptions,
) -> anyhow::Result<JobOutcome> {
    let now = OffsetDateTime::now_utc();
    let metadata = state.metadata.as_ref();

    match job_type {
        JobType::CertificateSync => {
            if state.sources.is_empty() {
                tracing::warn!("No certificate sources configured; nothing to sync");
            }
            let filters = sync::SyncFilters {
                environment: options
                    .environment
                    .clone()
                    .or_else(|| state.config.sources.environment_filter.clone()),
                server: options
                    .server
                    .clone()
                    .or_else(|| state.config.sources.server_filter.clone()),
            };
            let stats =
                sync::run_certificate_sync(metadata, &state.sources, &filters, options.dry_run, now)
                    .await;
            let mut outcome = JobOutcome::finished(&stats)?;
            if stats.all_failed() {
                outcome.error = Some(format!(
                    "every source failed: {}",
                    stats.failed_sources().join(", ")
                ));
            }
            Ok(outcome)
        }
        JobType::CertificateAlerts => {
            let stats = alerts::run_certificate_alerts(
                metadata,
                state.mailer.as_ref(),
                &state.config.alerts,
                options.dry_run,
                now,
            )
            .await?;
            JobOutcome::finished(&stats)
        }
        JobType::AnnouncementArchive => {
            let stats = archive::run_announcement_archive(metadata, options.dry_run, now).await?;
            JobOutcome::finished(&stats)
        }
        JobType::WeeklyReport => {
            let stats = report::run_weekly_report(
                metadata,
                state.mailer.as_ref(),
                &state.config,
                options.dry_run,
                now,
            )
            .await?;
            JobOutcome::finished(&stats)
        }
        JobType::DutySync => {
            let stats = duty::run_duty_sync(
                metadata,
                state.duty_source.as_deref(),
                &state.config.duty,
                options.dry_run,
                now,
            )
            .await?;
            JobOutcome::finished(&stats)
        }
        JobType::DutyNotification => {
            let stats = duty::run_duty_notification(
                metadata,
                state.mailer.as_ref(),
                &state.config.duty,
                options.dry_run,
                now,
            )
            .await?;
            JobOutcome::finished(&stats)
        }
    }
}

/// Fail jobs left queued or running by a previous process.
pub async fn recover_orphaned_jobs(metadata: &dyn MetadataStore) -> anyhow::Result<usize> {
    let orphans = metadata.get_orphaned_jobs().await?;
    let now = OffsetDateTime::now_utc();
    for job in &orphans {
        metadata
            .update_job_state(
                job.job_id,
                JobState::Failed.as_str(),
                Some(now),
                job.stats_json.as_deref(),
                Some("interrupted by server restart"),
            )
            .await?;
        tracing::warn!(
            job_id = %job.job_id,
            job_type = %job.job_type,
            "Orphaned job marked as failed"
        );
    }
    Ok(orphans.len())
}
