//! Time-based job triggers.

use crate::error::ApiError;
use crate::jobs::{self, JobOptions};
use crate::state::AppState;
use portall_core::Schedule;
use portall_core::config::ScheduleConfig;
use portall_metadata::repos::{JobTrigger, JobType};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

fn schedule_for(config: &ScheduleConfig, job_type: JobType) -> &Schedule {
    match job_type {
        JobType::CertificateSync => &config.certificate_sync,
        JobType::CertificateAlerts => &config.certificate_alerts,
        JobType::AnnouncementArchive => &config.announcement_archive,
        JobType::WeeklyReport => &config.weekly_report,
        JobType::DutySync => &config.duty_sync,
        JobType::DutyNotification => &config.duty_notification,
    }
}

/// Why a scheduled job type has nothing to do, if it has not.
fn unconfigured(state: &AppState, job_type: JobType) -> Option<&'static str> {
    match job_type {
        JobType::DutySync if state.duty_source.is_none() => Some("no duty roster feed configured"),
        JobType::DutyNotification if state.config.duty.recipients.is_empty() => {
            Some("no duty recipients configured")
        }
        _ => None,
    }
}

/// Next fire time per job type.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_runs: HashMap<JobType, OffsetDateTime>,
}

impl Scheduler {
    /// Plan the first run of every enabled schedule after `now`.
    pub fn new(config: &ScheduleConfig, now: OffsetDateTime) -> Self {
        let mut next_runs = HashMap::new();
        for job_type in JobType::ALL {
            match schedule_for(config, job_type).next_after(now) {
                Ok(Some(at)) => {
                    tracing::info!(job_type = job_type.as_str(), next_run = %at, "Job scheduled");
                    next_runs.insert(job_type, at);
                }
                Ok(None) => {
                    tracing::info!(job_type = job_type.as_str(), "Job schedule disabled");
                }
                Err(e) => {
                    tracing::error!(job_type = job_type.as_str(), error = %e, "Invalid job schedule");
                }
            }
        }
        Self { next_runs }
    }

    /// Job types due at `now`. Each returned type is re-planned after `now`.
    pub fn due(&mut self, config: &ScheduleConfig, now: OffsetDateTime) -> Vec<JobType> {
        let mut due: Vec<JobType> = self
            .next_runs
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(job_type, _)| *job_type)
            .collect();
        due.sort_by_key(|job_type| job_type.as_str());

        for job_type in &due {
            match schedule_for(config, *job_type).next_after(now) {
                Ok(Some(at)) => {
                    self.next_runs.insert(*job_type, at);
                }
                _ => {
                    self.next_runs.remove(job_type);
                }
            }
        }
        due
    }

    pub fn next_run(&self, job_type: JobType) -> Option<OffsetDateTime> {
        self.next_runs.get(&job_type).copied()
    }
}

/// Spawn the scheduler loop. Returns `None` when scheduling is disabled.
pub fn spawn_scheduler(state: AppState) -> Option<JoinHandle<()>> {
    if !state.config.schedule.enabled {
        tracing::info!("Automatic job scheduling disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let config = state.config.schedule.clone();
        let mut scheduler = Scheduler::new(&config, OffsetDateTime::now_utc());
        let mut ticker = tokio::time::interval(config.tick());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for job_type in scheduler.due(&config, OffsetDateTime::now_utc()) {
                if let Some(reason) = unconfigured(&state, job_type) {
                    tracing::debug!(job_type = job_type.as_str(), reason, "Scheduled job skipped");
                    continue;
                }
                match jobs::spawn_job(&state, job_type, JobTrigger::Schedule, JobOptions::default())
                    .await
                {
                    Ok(job_id) => {
                        tracing::info!(job_id = %job_id, job_type = job_type.as_str(), "Scheduled job started");
                    }
                    Err(ApiError::Conflict(reason)) => {
                        tracing::info!(job_type = job_type.as_str(), %reason, "Scheduled job skipped");
                    }
                    Err(e) => {
                        tracing::warn!(job_type = job_type.as_str(), error = %e, "Failed to start scheduled job");
                    }
                }
            }
        }
    }))
}
