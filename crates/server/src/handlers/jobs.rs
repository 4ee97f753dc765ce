//! Job trigger and history endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{format_time_opt, parse_id, read_json};
use crate::jobs::{self, JobOptions};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use portall_core::SessionScope;
use portall_metadata::models::JobRow;
use portall_metadata::repos::{JobRepo, JobTrigger, JobType};
use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct TriggerJobRequest {
    pub job_type: String,
    #[serde(flatten)]
    pub options: JobOptions,
}

#[derive(Debug, Serialize)]
pub struct TriggerJobResponse {
    pub job_id: String,
    pub job_type: String,
    pub dry_run: bool,
}

/// Scope needed to trigger a job type.
fn required_scope(job_type: JobType) -> SessionScope {
    match job_type {
        JobType::CertificateSync | JobType::CertificateAlerts => SessionScope::CertificatesManage,
        JobType::AnnouncementArchive
        | JobType::WeeklyReport
        | JobType::DutySync
        | JobType::DutyNotification => SessionScope::PortalAdmin,
    }
}

/// POST /v1/admin/jobs - Trigger a background job.
pub async fn trigger_job(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<TriggerJobResponse>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::CertificatesManage)?;

    let body: TriggerJobRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let job_type = JobType::parse(body.job_type.trim()).ok_or_else(|| {
        ApiError::validation("job_type", format!("unknown job type: {}", body.job_type))
    })?;
    auth.require_scope(required_scope(job_type))?;

    let dry_run = body.options.dry_run;
    let job_id = jobs::spawn_job(&state, job_type, JobTrigger::Manual, body.options).await?;
    tracing::info!(
        job_id = %job_id,
        job_type = job_type.as_str(),
        dry_run,
        by = %auth.username(),
        "Job triggered"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerJobResponse {
            job_id: job_id.to_string(),
            job_type: job_type.as_str().to_string(),
            dry_run,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub job_type: String,
    pub triggered_by: String,
    pub state: String,
    pub dry_run: bool,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub stats: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TryFrom<JobRow> for JobResponse {
    type Error = ApiError;

    fn try_from(row: JobRow) -> ApiResult<Self> {
        let stats = row
            .stats_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| ApiError::Internal(format!("corrupt job stats: {e}")))?;
        Ok(Self {
            job_id: row.job_id.to_string(),
            job_type: row.job_type,
            triggered_by: row.triggered_by,
            state: row.state,
            dry_run: row.dry_run,
            started_at: format_time_opt(row.started_at)?,
            finished_at: format_time_opt(row.finished_at)?,
            stats,
            error: row.error,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub job_type: Option<String>,
    pub limit: Option<u32>,
}

/// GET /v1/admin/jobs - Recent jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
    req: Request,
) -> ApiResult<Json<Vec<JobResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::CertificatesManage)?;

    let job_type = params
        .job_type
        .as_deref()
        .map(|raw| {
            JobType::parse(raw)
                .ok_or_else(|| ApiError::validation("job_type", format!("unknown job type: {raw}")))
        })
        .transpose()?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let rows = state
        .metadata
        .list_recent_jobs(job_type.map(|t| t.as_str()), limit)
        .await?;
    let response: ApiResult<Vec<JobResponse>> =
        rows.into_iter().map(JobResponse::try_from).collect();
    Ok(Json(response?))
}

/// GET /v1/admin/jobs/{id} - Job state and stats.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<JobResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::CertificatesManage)?;

    let row = state
        .metadata
        .get_job(parse_id("job", &id)?)
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;
    Ok(Json(row.try_into()?))
}
