//! Application state shared across handlers and jobs.

use portall_core::config::AppConfig;
use portall_metadata::MetadataStore;
use portall_metadata::repos::JobState;
use portall_notify::Mailer;
use portall_sources::{CertificateSource, DutyRosterSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Tracks spawned background jobs so a panicked one does not stay `running`.
///
/// A job stuck in `running` blocks every later run of its type. The watchdog
/// notices finished handles and marks panicked or cancelled jobs as `failed`
/// within ~10s.
pub struct JobTaskRegistry {
    /// Map of job_id -> (job type, task handle)
    tasks: Arc<Mutex<HashMap<Uuid, (String, JoinHandle<()>)>>>,
    /// Metadata store for updating job state
    metadata: Arc<dyn MetadataStore>,
}

impl JobTaskRegistry {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            metadata,
        }
    }

    /// Register a spawned job task.
    pub async fn register(&self, job_id: Uuid, job_type: &str, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .await
            .insert(job_id, (job_type.to_string(), handle));
    }

    /// Number of tracked tasks that have not been reaped yet.
    pub async fn tracked(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Spawn the watchdog. Keep the handle for the lifetime of the server.
    pub fn spawn_watchdog(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(10)).await;
                self.check_tasks().await;
            }
        })
    }

    /// Reap finished tasks and fail the jobs whose task panicked or was
    /// cancelled.
    pub async fn check_tasks(&self) {
        let finished: Vec<(Uuid, String, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock().await;
            let done: Vec<Uuid> = tasks
                .iter()
                .filter(|(_, (_, handle))| handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            done.into_iter()
                .filter_map(|id| tasks.remove(&id).map(|(t, h)| (id, t, h)))
                .collect()
        };

        for (job_id, job_type, handle) in finished {
            let reason = match handle.await {
                Ok(()) => {
                    tracing::debug!(job_id = %job_id, job_type = %job_type, "Job task completed");
                    continue;
                }
                Err(join_err) if join_err.is_panic() => {
                    crate::metrics::JOBS_PANICKED.inc();
                    tracing::error!(
                        job_id = %job_id,
                        job_type = %job_type,
                        panic = ?join_err,
                        "Job task panicked, marking job as failed"
                    );
                    "job task panicked"
                }
                Err(join_err) => {
                    tracing::warn!(
                        job_id = %job_id,
                        job_type = %job_type,
                        error = ?join_err,
                        "Job task was cancelled, marking job as failed"
                    );
                    "job task cancelled"
                }
            };

            // The task never reached its own bookkeeping.
            crate::metrics::JOBS_ACTIVE.dec();
            crate::metrics::JOB_RUNS
                .with_label_values(&[job_type.as_str(), JobState::Failed.as_str()])
                .inc();

            let stats = serde_json::json!({ "aborted": reason }).to_string();
            if let Err(e) = self
                .metadata
                .update_job_state(
                    job_id,
                    JobState::Failed.as_str(),
                    Some(time::OffsetDateTime::now_utc()),
                    Some(&stats),
                    Some(reason),
                )
                .await
            {
                tracing::error!(
                    job_id = %job_id,
                    error = %e,
                    "Failed to mark aborted job as failed"
                );
            }
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (validated at startup).
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Configured certificate sources, in sync order.
    pub sources: Arc<Vec<Arc<dyn CertificateSource>>>,
    /// Outbound mail.
    pub mailer: Arc<dyn Mailer>,
    /// On-call roster feed, when one is configured.
    pub duty_source: Option<Arc<dyn DutyRosterSource>>,
    /// Background job registry for panic detection.
    pub job_registry: Arc<JobTaskRegistry>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        sources: Vec<Arc<dyn CertificateSource>>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let job_registry = Arc::new(JobTaskRegistry::new(metadata.clone()));
        Self {
            config: Arc::new(config),
            metadata,
            sources: Arc::new(sources),
            mailer,
            duty_source: None,
            job_registry,
        }
    }

    pub fn with_duty_source(mut self, source: Arc<dyn DutyRosterSource>) -> Self {
        self.duty_source = Some(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portall_metadata::SqliteStore;
    use portall_metadata::models::JobRow;
    use portall_metadata::repos::{JobTrigger, JobType};
    use tempfile::tempdir;

    async fn running_job(metadata: &Arc<dyn MetadataStore>, job_type: JobType) -> JobRow {
        let job = JobRow {
            job_id: Uuid::new_v4(),
            job_type: job_type.as_str().to_string(),
            triggered_by: JobTrigger::Manual.as_str().to_string(),
            state: JobState::Running.as_str().to_string(),
            dry_run: false,
            started_at: Some(time::OffsetDateTime::now_utc()),
            finished_at: None,
            stats_json: None,
            error: None,
        };
        metadata.create_job(&job).await.unwrap();
        job
    }

    async fn sqlite(temp: &tempfile::TempDir) -> Arc<dyn MetadataStore> {
        Arc::new(
            SqliteStore::new(temp.path().join("portall.db"))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_panicked_job_is_marked_failed() {
        let temp = tempdir().unwrap();
        let metadata = sqlite(&temp).await;
        let registry = JobTaskRegistry::new(metadata.clone());
        let job = running_job(&metadata, JobType::CertificateSync).await;

        let handle = tokio::spawn(async { panic!("boom") });
        registry
            .register(job.job_id, &job.job_type, handle)
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.check_tasks().await;

        let stored = metadata.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.state, "failed");
        assert_eq!(stored.error.as_deref(), Some("job task panicked"));
        assert_eq!(registry.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_job_is_marked_failed() {
        let temp = tempdir().unwrap();
        let metadata = sqlite(&temp).await;
        let registry = JobTaskRegistry::new(metadata.clone());
        let job = running_job(&metadata, JobType::CertificateAlerts).await;

        let handle = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(3600)).await });
        handle.abort();
        registry
            .register(job.job_id, &job.job_type, handle)
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.check_tasks().await;

        let stored = metadata.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.state, "failed");
        assert_eq!(stored.error.as_deref(), Some("job task cancelled"));
    }

    #[tokio::test]
    async fn test_completed_task_is_reaped_without_touching_job() {
        let temp = tempdir().unwrap();
        let metadata = sqlite(&temp).await;
        let registry = JobTaskRegistry::new(metadata.clone());
        let job = running_job(&metadata, JobType::WeeklyReport).await;

        registry
            .register(job.job_id, &job.job_type, tokio::spawn(async {}))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.check_tasks().await;

        assert_eq!(registry.tracked().await, 0);
        let stored = metadata.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.state, "running");
    }
}
