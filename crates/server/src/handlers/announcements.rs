//! Announcement endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{
    clean_opt, format_time, format_time_opt, parse_id, parse_time_opt, read_json,
};
use crate::handlers::content::{
    StatusChangeRequest, change_status, ensure_visible, resolve_category, visible_status,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use portall_core::content::validate_title;
use portall_core::{AnnouncementKind, ContentStatus, Priority, SessionScope, slugify};
use portall_metadata::models::{AnnouncementFilter, AnnouncementRow, ContentTable};
use portall_metadata::repos::AnnouncementRepo;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Slug suffixes tried before giving up.
const MAX_SLUG_ATTEMPTS: u32 = 100;

#[derive(Debug, Serialize)]
pub struct AnnouncementResponse {
    pub announcement_id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub summary: Option<String>,
    pub kind: String,
    pub priority: String,
    pub status: String,
    pub pinned: bool,
    pub related_system: Option<String>,
    pub category_id: Option<String>,
    pub owner: String,
    pub work_date: Option<String>,
    pub published_at: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<AnnouncementRow> for AnnouncementResponse {
    type Error = ApiError;

    fn try_from(row: AnnouncementRow) -> ApiResult<Self> {
        Ok(Self {
            announcement_id: row.announcement_id.to_string(),
            title: row.title,
            slug: row.slug,
            content: row.content,
            summary: row.summary,
            kind: row.kind,
            priority: row.priority,
            status: row.status,
            pinned: row.pinned,
            related_system: row.related_system,
            category_id: row.category_id.map(|id| id.to_string()),
            owner: row.owner,
            work_date: format_time_opt(row.work_date)?,
            published_at: format_time_opt(row.published_at)?,
            expires_at: format_time_opt(row.expires_at)?,
            created_at: format_time(row.created_at)?,
            updated_at: format_time(row.updated_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub kind: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    pub related_system: Option<String>,
    pub category_id: Option<String>,
    pub work_date: Option<String>,
    pub expires_at: Option<String>,
    /// Create directly in `published` state.
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAnnouncementRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub kind: Option<String>,
    pub priority: Option<String>,
    pub pinned: Option<bool>,
    pub related_system: Option<String>,
    pub category_id: Option<String>,
    pub work_date: Option<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListAnnouncementsParams {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub category_id: Option<String>,
    pub pinned: Option<bool>,
    /// Maximum number of rows (default: 50, max: 200).
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

fn validate_content(content: &str) -> ApiResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("content", "must not be empty"));
    }
    Ok(content.to_string())
}

/// Derive a free slug from the title, appending `-2`, `-3`, ... on collision.
async fn unique_slug(state: &AppState, title: &str) -> ApiResult<String> {
    let base = match slugify(title) {
        s if s.is_empty() => "announcement".to_string(),
        s => s,
    };
    if !state.metadata.slug_exists(&base).await? {
        return Ok(base);
    }
    for n in 2..=MAX_SLUG_ATTEMPTS {
        let candidate = format!("{base}-{n}");
        if !state.metadata.slug_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(ApiError::Conflict(format!(
        "too many announcements share the slug '{base}'"
    )))
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<AnnouncementRow> {
    state
        .metadata
        .get_announcement(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("announcement not found".to_string()))
}

/// GET /v1/announcements - List announcements, pinned first.
pub async fn list_announcements(
    State(state): State<AppState>,
    Query(params): Query<ListAnnouncementsParams>,
    req: Request,
) -> ApiResult<Json<Vec<AnnouncementResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let kind = params
        .kind
        .as_deref()
        .map(AnnouncementKind::parse)
        .transpose()?
        .map(|k| k.as_str().to_string());
    let category_id = params
        .category_id
        .as_deref()
        .map(|id| parse_id("category", id))
        .transpose()?;

    let filter = AnnouncementFilter {
        status: visible_status(auth, params.status.as_deref())?,
        kind,
        category_id,
        pinned: params.pinned,
        limit: params.limit.unwrap_or(50).clamp(1, 200),
        offset: params.offset.unwrap_or(0),
    };

    let rows = state.metadata.list_announcements(&filter).await?;
    let response: ApiResult<Vec<AnnouncementResponse>> =
        rows.into_iter().map(AnnouncementResponse::try_from).collect();
    Ok(Json(response?))
}

/// POST /v1/announcements - Create an announcement.
pub async fn create_announcement(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<AnnouncementResponse>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;

    let body: CreateAnnouncementRequest =
        read_json(req, state.config.server.max_body_bytes).await?;

    let title = validate_title("title", &body.title)?;
    let content = validate_content(&body.content)?;
    let kind = body
        .kind
        .as_deref()
        .map(AnnouncementKind::parse)
        .transpose()?
        .unwrap_or_default();
    let priority = body
        .priority
        .as_deref()
        .map(Priority::parse)
        .transpose()?
        .unwrap_or_default();
    let category_id = resolve_category(&state, body.category_id.as_deref()).await?;
    let work_date = parse_time_opt("work_date", body.work_date.as_deref())?;
    let expires_at = parse_time_opt("expires_at", body.expires_at.as_deref())?;
    let slug = unique_slug(&state, &title).await?;

    let now = OffsetDateTime::now_utc();
    let status = if body.publish {
        ContentStatus::Published
    } else {
        ContentStatus::Draft
    };
    let row = AnnouncementRow {
        announcement_id: Uuid::new_v4(),
        title,
        slug,
        content,
        summary: clean_opt(body.summary),
        kind: kind.as_str().to_string(),
        priority: priority.as_str().to_string(),
        status: status.as_str().to_string(),
        pinned: body.pinned,
        related_system: clean_opt(body.related_system),
        category_id,
        owner: auth.username().to_string(),
        work_date,
        published_at: body.publish.then_some(now),
        expires_at,
        created_at: now,
        updated_at: now,
    };

    state.metadata.create_announcement(&row).await?;
    tracing::info!(
        announcement_id = %row.announcement_id,
        slug = %row.slug,
        status = %row.status,
        owner = %row.owner,
        "Announcement created"
    );

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// GET /v1/announcements/{id} - Get an announcement.
pub async fn get_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<AnnouncementResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let row = load(&state, parse_id("announcement", &id)?).await?;
    ensure_visible(auth, &row.status, "announcement")?;
    Ok(Json(row.try_into()?))
}

/// PUT /v1/announcements/{id} - Update editable fields.
///
/// Archived announcements are read-only.
pub async fn update_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<AnnouncementResponse>> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;
    let id = parse_id("announcement", &id)?;

    let body: UpdateAnnouncementRequest =
        read_json(req, state.config.server.max_body_bytes).await?;

    let mut row = load(&state, id).await?;
    if !ContentStatus::parse(&row.status)?.is_editable() {
        return Err(ApiError::Conflict(
            "archived announcements are read-only".to_string(),
        ));
    }

    if let Some(title) = body.title {
        row.title = validate_title("title", &title)?;
    }
    if let Some(content) = body.content {
        row.content = validate_content(&content)?;
    }
    if let Some(summary) = body.summary {
        row.summary = clean_opt(Some(summary));
    }
    if let Some(kind) = body.kind {
        row.kind = AnnouncementKind::parse(&kind)?.as_str().to_string();
    }
    if let Some(priority) = body.priority {
        row.priority = Priority::parse(&priority)?.as_str().to_string();
    }
    if let Some(pinned) = body.pinned {
        row.pinned = pinned;
    }
    if let Some(related_system) = body.related_system {
        row.related_system = clean_opt(Some(related_system));
    }
    if let Some(category_id) = body.category_id {
        row.category_id = resolve_category(&state, Some(&category_id)).await?;
    }
    if let Some(work_date) = body.work_date {
        row.work_date = parse_time_opt("work_date", Some(&work_date))?;
    }
    if let Some(expires_at) = body.expires_at {
        row.expires_at = parse_time_opt("expires_at", Some(&expires_at))?;
    }
    row.updated_at = OffsetDateTime::now_utc();

    state.metadata.update_announcement(&row).await?;
    Ok(Json(row.try_into()?))
}

/// DELETE /v1/announcements/{id} - Delete an announcement (admin only).
pub async fn delete_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalAdmin)?;

    let id = parse_id("announcement", &id)?;
    state.metadata.delete_announcement(id).await?;
    tracing::info!(announcement_id = %id, by = %auth.username(), "Announcement deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/announcements/{id}/status - Move along draft -> published -> archived.
pub async fn change_announcement_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<AnnouncementResponse>> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;
    let id = parse_id("announcement", &id)?;

    let body: StatusChangeRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let row = load(&state, id).await?;
    change_status(
        &state,
        ContentTable::Announcements,
        id,
        &row.status,
        &body.status,
        auth.username(),
    )
    .await?;

    Ok(Json(load(&state, id).await?.try_into()?))
}
