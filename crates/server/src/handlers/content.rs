//! Category, link and inventory endpoints, and the shared status change.

use crate::auth::{AuthenticatedUser, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{clean_opt, format_time, parse_id, read_json};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use portall_core::content::{validate_color, validate_title, validate_url};
use portall_core::{ContentStatus, InventoryType, SessionScope};
use portall_metadata::models::{CategoryRow, ContentTable, InventoryRow, LinkRow};
use portall_metadata::repos::ContentRepo;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Body of every `POST .../{id}/status` endpoint.
#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

/// Validate and apply a status change as a compare-and-set on `current`.
///
/// Illegal moves are rejected with 409 before touching the store. A row
/// changed concurrently also yields 409.
pub(crate) async fn change_status(
    state: &AppState,
    table: ContentTable,
    id: Uuid,
    current: &str,
    target: &str,
    actor: &str,
) -> ApiResult<()> {
    let from = ContentStatus::parse(current)?;
    let to = ContentStatus::parse(target)?;
    from.transition(to)?;

    state
        .metadata
        .transition_status(table, id, from.as_str(), to.as_str(), OffsetDateTime::now_utc())
        .await?;
    tracing::info!(
        entity = table.entity(),
        id = %id,
        from = from.as_str(),
        to = to.as_str(),
        by = %actor,
        "Status changed"
    );
    Ok(())
}

/// Status filter for a listing.
///
/// Writers may ask for any status; everyone else only sees published rows.
pub(crate) fn visible_status(
    auth: &AuthenticatedUser,
    requested: Option<&str>,
) -> ApiResult<Option<String>> {
    let requested = requested.map(ContentStatus::parse).transpose()?;
    if auth.has_scope(SessionScope::ContentWrite) {
        Ok(requested.map(|s| s.as_str().to_string()))
    } else {
        Ok(Some(ContentStatus::Published.as_str().to_string()))
    }
}

fn initial_status(publish: bool) -> ContentStatus {
    if publish {
        ContentStatus::Published
    } else {
        ContentStatus::Draft
    }
}

/// Readers without write access only see published rows.
pub(crate) fn ensure_visible(
    auth: &AuthenticatedUser,
    status: &str,
    entity: &str,
) -> ApiResult<()> {
    if auth.has_scope(SessionScope::ContentWrite) || status == ContentStatus::Published.as_str() {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("{entity} not found")))
    }
}

/// Resolve an optional `category_id` field to a stored category.
pub(crate) async fn resolve_category(state: &AppState, raw: Option<&str>) -> ApiResult<Option<Uuid>> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(None);
    };
    let id = Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::validation("category_id", "must be a UUID"))?;
    if state.metadata.get_category(id).await?.is_none() {
        return Err(ApiError::validation("category_id", "unknown category"));
    }
    Ok(Some(id))
}

#[derive(Debug, Deserialize)]
pub struct StatusFilterParams {
    pub status: Option<String>,
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub category_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub position: i32,
    pub status: String,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<CategoryRow> for CategoryResponse {
    type Error = ApiError;

    fn try_from(row: CategoryRow) -> ApiResult<Self> {
        Ok(Self {
            category_id: row.category_id.to_string(),
            name: row.name,
            description: row.description,
            color: row.color,
            position: row.position,
            status: row.status,
            owner: row.owner,
            created_at: format_time(row.created_at)?,
            updated_at: format_time(row.updated_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub publish: bool,
}

/// GET /v1/categories - List categories.
pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<StatusFilterParams>,
    req: Request,
) -> ApiResult<Json<Vec<CategoryResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let status = visible_status(auth, params.status.as_deref())?;
    let rows = state.metadata.list_categories(status.as_deref()).await?;
    let response: ApiResult<Vec<CategoryResponse>> =
        rows.into_iter().map(CategoryResponse::try_from).collect();
    Ok(Json(response?))
}

/// POST /v1/categories - Create a category.
pub async fn create_category(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CategoryResponse>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;

    let body: CreateCategoryRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let name = validate_title("name", &body.name)?;
    let color = body
        .color
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| validate_color(c.trim()))
        .transpose()?;

    let now = OffsetDateTime::now_utc();
    let row = CategoryRow {
        category_id: Uuid::new_v4(),
        name,
        description: clean_opt(body.description),
        color,
        position: body.position,
        status: initial_status(body.publish).as_str().to_string(),
        owner: auth.username().to_string(),
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_category(&row).await?;
    tracing::info!(category_id = %row.category_id, name = %row.name, "Category created");

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// DELETE /v1/categories/{id} - Delete a category (admin only).
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalAdmin)?;

    state
        .metadata
        .delete_category(parse_id("category", &id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Links
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub link_id: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub is_internal: bool,
    pub requires_vpn: bool,
    pub status: String,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<LinkRow> for LinkResponse {
    type Error = ApiError;

    fn try_from(row: LinkRow) -> ApiResult<Self> {
        Ok(Self {
            link_id: row.link_id.to_string(),
            title: row.title,
            url: row.url,
            description: row.description,
            category_id: row.category_id.map(|id| id.to_string()),
            is_internal: row.is_internal,
            requires_vpn: row.requires_vpn,
            status: row.status,
            owner: row.owner,
            created_at: format_time(row.created_at)?,
            updated_at: format_time(row.updated_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub is_internal: bool,
    #[serde(default)]
    pub requires_vpn: bool,
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListLinksParams {
    pub status: Option<String>,
    pub category_id: Option<String>,
}

async fn load_link(state: &AppState, id: Uuid) -> ApiResult<LinkRow> {
    state
        .metadata
        .get_link(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("link not found".to_string()))
}

/// GET /v1/links - List links.
pub async fn list_links(
    State(state): State<AppState>,
    Query(params): Query<ListLinksParams>,
    req: Request,
) -> ApiResult<Json<Vec<LinkResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let status = visible_status(auth, params.status.as_deref())?;
    let category_id = params
        .category_id
        .as_deref()
        .map(|id| parse_id("category", id))
        .transpose()?;
    let rows = state
        .metadata
        .list_links(status.as_deref(), category_id)
        .await?;
    let response: ApiResult<Vec<LinkResponse>> =
        rows.into_iter().map(LinkResponse::try_from).collect();
    Ok(Json(response?))
}

/// POST /v1/links - Create a link.
pub async fn create_link(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<LinkResponse>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;

    let body: CreateLinkRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let title = validate_title("title", &body.title)?;
    let url = validate_url(&body.url)?;
    let category_id = resolve_category(&state, body.category_id.as_deref()).await?;

    let now = OffsetDateTime::now_utc();
    let row = LinkRow {
        link_id: Uuid::new_v4(),
        title,
        url,
        description: clean_opt(body.description),
        category_id,
        is_internal: body.is_internal,
        requires_vpn: body.requires_vpn,
        status: initial_status(body.publish).as_str().to_string(),
        owner: auth.username().to_string(),
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_link(&row).await?;

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// GET /v1/links/{id} - Get a link.
pub async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<LinkResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let row = load_link(&state, parse_id("link", &id)?).await?;
    ensure_visible(auth, &row.status, "link")?;
    Ok(Json(row.try_into()?))
}

/// DELETE /v1/links/{id} - Delete a link (admin only).
pub async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalAdmin)?;

    state.metadata.delete_link(parse_id("link", &id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/links/{id}/status - Change link status.
pub async fn change_link_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<LinkResponse>> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;
    let id = parse_id("link", &id)?;

    let body: StatusChangeRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let row = load_link(&state, id).await?;
    change_status(
        &state,
        ContentTable::Links,
        id,
        &row.status,
        &body.status,
        auth.username(),
    )
    .await?;

    Ok(Json(load_link(&state, id).await?.try_into()?))
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub item_id: String,
    pub hostname: String,
    pub item_type: String,
    pub environment: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<InventoryRow> for InventoryResponse {
    type Error = ApiError;

    fn try_from(row: InventoryRow) -> ApiResult<Self> {
        Ok(Self {
            item_id: row.item_id.to_string(),
            hostname: row.hostname,
            item_type: row.item_type,
            environment: row.environment,
            description: row.description,
            status: row.status,
            owner: row.owner,
            created_at: format_time(row.created_at)?,
            updated_at: format_time(row.updated_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInventoryRequest {
    pub hostname: String,
    pub item_type: Option<String>,
    pub environment: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListInventoryParams {
    pub status: Option<String>,
    pub item_type: Option<String>,
}

async fn load_item(state: &AppState, id: Uuid) -> ApiResult<InventoryRow> {
    state
        .metadata
        .get_inventory_item(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("inventory item not found".to_string()))
}

/// GET /v1/inventory - List inventory items.
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(params): Query<ListInventoryParams>,
    req: Request,
) -> ApiResult<Json<Vec<InventoryResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let status = visible_status(auth, params.status.as_deref())?;
    let item_type = params
        .item_type
        .as_deref()
        .map(InventoryType::parse)
        .transpose()?;
    let rows = state
        .metadata
        .list_inventory(status.as_deref(), item_type.map(|t| t.as_str()))
        .await?;
    let response: ApiResult<Vec<InventoryResponse>> =
        rows.into_iter().map(InventoryResponse::try_from).collect();
    Ok(Json(response?))
}

/// POST /v1/inventory - Create an inventory item.
pub async fn create_inventory_item(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<InventoryResponse>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;

    let body: CreateInventoryRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let hostname = validate_title("hostname", &body.hostname)?.to_ascii_lowercase();
    if hostname.contains(char::is_whitespace) {
        return Err(ApiError::validation("hostname", "must not contain whitespace"));
    }
    let item_type = body
        .item_type
        .as_deref()
        .map(InventoryType::parse)
        .transpose()?
        .unwrap_or_default();

    let now = OffsetDateTime::now_utc();
    let row = InventoryRow {
        item_id: Uuid::new_v4(),
        hostname,
        item_type: item_type.as_str().to_string(),
        environment: clean_opt(body.environment).map(|e| e.to_ascii_lowercase()),
        description: clean_opt(body.description),
        status: initial_status(body.publish).as_str().to_string(),
        owner: auth.username().to_string(),
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_inventory_item(&row).await?;

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// GET /v1/inventory/{id} - Get an inventory item.
pub async fn get_inventory_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<InventoryResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let row = load_item(&state, parse_id("inventory item", &id)?).await?;
    ensure_visible(auth, &row.status, "inventory item")?;
    Ok(Json(row.try_into()?))
}

/// DELETE /v1/inventory/{id} - Delete an inventory item (admin only).
pub async fn delete_inventory_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalAdmin)?;

    state
        .metadata
        .delete_inventory_item(parse_id("inventory item", &id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/inventory/{id}/status - Change inventory item status.
pub async fn change_inventory_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<InventoryResponse>> {
    let auth = require_auth(&req)?.clone();
    auth.require_scope(SessionScope::ContentWrite)?;
    let id = parse_id("inventory item", &id)?;

    let body: StatusChangeRequest = read_json(req, state.config.server.max_body_bytes).await?;
    let row = load_item(&state, id).await?;
    change_status(
        &state,
        ContentTable::Inventory,
        id,
        &row.status,
        &body.status,
        auth.username(),
    )
    .await?;

    Ok(Json(load_item(&state, id).await?.try_into()?))
}
