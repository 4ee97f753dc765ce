//! Session management (admin only).

use crate::auth::{hash_secret, random_token, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{clean_opt, format_time, format_time_opt, parse_id, read_json};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use portall_core::SessionScope;
use portall_metadata::models::SessionRow;
use portall_metadata::repos::{BootstrapRepo, SessionRepo};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub username: String,
    pub scopes: Vec<String>,
    /// Defaults to `server.session_ttl_secs`.
    pub expires_in_secs: Option<u64>,
    pub description: Option<String>,
}

/// Returned once; the secret is not retrievable afterwards.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub session_secret: String,
    pub csrf_token: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub username: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub last_seen_at: Option<String>,
    pub description: Option<String>,
}

impl TryFrom<SessionRow> for SessionInfo {
    type Error = ApiError;

    fn try_from(row: SessionRow) -> ApiResult<Self> {
        let scopes: Vec<String> = serde_json::from_str(&row.scopes)
            .map_err(|e| ApiError::Internal(format!("invalid session scopes: {e}")))?;
        Ok(Self {
            session_id: row.session_id.to_string(),
            username: row.username,
            scopes,
            expires_at: format_time_opt(row.expires_at)?,
            revoked_at: format_time_opt(row.revoked_at)?,
            created_at: format_time(row.created_at)?,
            last_seen_at: format_time_opt(row.last_seen_at)?,
            description: row.description,
        })
    }
}

/// POST /v1/admin/sessions - Issue a session.
pub async fn create_session(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::PortalAdmin)?;

    let body: CreateSessionRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let username = body.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::validation("username", "must not be empty"));
    }
    if body.scopes.is_empty() {
        return Err(ApiError::validation("scopes", "at least one scope is required"));
    }
    for scope in &body.scopes {
        SessionScope::parse(scope)
            .map_err(|_| ApiError::validation("scopes", format!("invalid scope: {scope}")))?;
    }

    let now = OffsetDateTime::now_utc();
    let ttl = match body.expires_in_secs {
        Some(0) => return Err(ApiError::validation("expires_in_secs", "must be positive")),
        Some(secs) => time::Duration::seconds(i64::try_from(secs).map_err(|_| {
            ApiError::validation("expires_in_secs", format!("too large: {secs}"))
        })?),
        None => state.config.server.session_ttl(),
    };
    let expires_at = now + ttl;

    let session_secret = random_token();
    let row = SessionRow {
        session_id: Uuid::new_v4(),
        session_hash: hash_secret(&session_secret),
        username,
        scopes: serde_json::to_string(&body.scopes)
            .map_err(|e| ApiError::Internal(format!("failed to serialize scopes: {e}")))?,
        csrf_token: random_token(),
        expires_at: Some(expires_at),
        revoked_at: None,
        created_at: now,
        last_seen_at: None,
        description: clean_opt(body.description),
    };
    state.metadata.create_session(&row).await?;
    tracing::info!(
        session_id = %row.session_id,
        username = %row.username,
        by = %auth.username(),
        "Session created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: row.session_id.to_string(),
            session_secret,
            csrf_token: row.csrf_token,
            expires_at: Some(format_time(expires_at)?),
        }),
    ))
}

/// GET /v1/admin/sessions - List sessions without secrets.
pub async fn list_sessions(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<SessionInfo>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalAdmin)?;

    let rows = state.metadata.list_sessions().await?;
    let response: ApiResult<Vec<SessionInfo>> =
        rows.into_iter().map(SessionInfo::try_from).collect();
    Ok(Json(response?))
}

/// DELETE /v1/admin/sessions/{id} - Revoke a session.
///
/// The bootstrap admin session is managed by configuration and cannot be
/// revoked here.
pub async fn revoke_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalAdmin)?;

    let session_id = parse_id("session", &id)?;
    if state.metadata.get_session(session_id).await?.is_none() {
        return Err(ApiError::NotFound("session not found".to_string()));
    }
    if state.metadata.get_bootstrap_session_id().await? == Some(session_id) {
        return Err(ApiError::Conflict(
            "the bootstrap admin session is managed by configuration".to_string(),
        ));
    }

    state
        .metadata
        .revoke_session(session_id, OffsetDateTime::now_utc())
        .await?;
    tracing::info!(session_id = %session_id, by = %auth.username(), "Session revoked");
    Ok(StatusCode::NO_CONTENT)
}
