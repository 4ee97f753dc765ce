//! Read-only certificate endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{format_time, format_time_opt, parse_id};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use portall_core::{CertificateKind, SessionScope, days_until};
use portall_metadata::models::{CertificateFilter, CertificateRow, CertificateStats, NotificationRow};
use portall_metadata::repos::{CertificateRepo, NotificationRepo};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
pub struct CertificateResponse {
    pub certificate_id: String,
    pub kind: String,
    pub common_name: String,
    pub serial_number: Option<String>,
    pub alias: Option<String>,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub server_hostname: Option<String>,
    pub application_name: Option<String>,
    pub environment: Option<String>,
    pub keystore_path: Option<String>,
    pub keystore_type: Option<String>,
    pub signature_algorithm: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    /// Whole days until expiry; negative once expired, absent when invalid.
    pub days_until_expiry: Option<i64>,
    pub expiry_error: Option<String>,
    pub source: String,
    pub is_active: bool,
    pub is_monitored: bool,
    pub last_synced_at: String,
}

impl CertificateResponse {
    fn from_row(row: CertificateRow, now: OffsetDateTime) -> ApiResult<Self> {
        Ok(Self {
            certificate_id: row.certificate_id.to_string(),
            days_until_expiry: row.valid_to.map(|to| days_until(to, now)),
            valid_from: format_time_opt(row.valid_from)?,
            valid_to: format_time_opt(row.valid_to)?,
            last_synced_at: format_time(row.last_synced_at)?,
            kind: row.kind,
            common_name: row.common_name,
            serial_number: row.serial_number,
            alias: row.alias,
            subject: row.subject,
            issuer: row.issuer,
            server_hostname: row.server_hostname,
            application_name: row.application_name,
            environment: row.environment,
            keystore_path: row.keystore_path,
            keystore_type: row.keystore_type,
            signature_algorithm: row.signature_algorithm,
            expiry_error: row.expiry_error,
            source: row.source,
            is_active: row.is_active,
            is_monitored: row.is_monitored,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCertificatesParams {
    pub kind: Option<String>,
    pub environment: Option<String>,
    pub server: Option<String>,
    pub expiring_within_days: Option<u32>,
    pub invalid: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /v1/certificates - List active certificates ordered by expiry.
pub async fn list_certificates(
    State(state): State<AppState>,
    Query(params): Query<ListCertificatesParams>,
    req: Request,
) -> ApiResult<Json<Vec<CertificateResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let kind = match params.kind.as_deref() {
        Some("kdb") => Some(CertificateKind::Kdb),
        Some("java") => Some(CertificateKind::Java),
        Some(_) => return Err(ApiError::validation("kind", "must be kdb or java")),
        None => None,
    };
    let now = OffsetDateTime::now_utc();
    let filter = CertificateFilter {
        kind: kind.map(|k| k.as_str().to_string()),
        environment: params.environment.map(|e| e.trim().to_ascii_lowercase()),
        server: params.server.map(|s| s.trim().to_ascii_lowercase()),
        expiring_before: params
            .expiring_within_days
            .map(|days| now + time::Duration::days(i64::from(days))),
        invalid: params.invalid,
        active_only: true,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset: params.offset.unwrap_or(0),
    };

    let rows = state.metadata.list_certificates(&filter).await?;
    let response: ApiResult<Vec<CertificateResponse>> = rows
        .into_iter()
        .map(|row| CertificateResponse::from_row(row, now))
        .collect();
    Ok(Json(response?))
}

/// GET /v1/certificates/stats - Counters over active certificates.
pub async fn certificate_stats(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<CertificateStats>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let stats = state
        .metadata
        .certificate_stats(OffsetDateTime::now_utc())
        .await?;
    Ok(Json(stats))
}

/// GET /v1/certificates/{id} - Get a certificate.
pub async fn get_certificate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<CertificateResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let row = state
        .metadata
        .get_certificate(parse_id("certificate", &id)?)
        .await?
        .ok_or_else(|| ApiError::NotFound("certificate not found".to_string()))?;
    Ok(Json(CertificateResponse::from_row(
        row,
        OffsetDateTime::now_utc(),
    )?))
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub notification_id: String,
    pub tier: String,
    pub cycle_key: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub state: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub sent_at: Option<String>,
}

impl TryFrom<NotificationRow> for NotificationResponse {
    type Error = ApiError;

    fn try_from(row: NotificationRow) -> ApiResult<Self> {
        Ok(Self {
            notification_id: row.notification_id.to_string(),
            tier: row.tier,
            cycle_key: row.cycle_key,
            recipients: row
                .recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect(),
            subject: row.subject,
            state: row.state,
            error_message: row.error_message,
            created_at: format_time(row.created_at)?,
            sent_at: format_time_opt(row.sent_at)?,
        })
    }
}

/// GET /v1/certificates/{id}/notifications - Alert delivery log.
pub async fn list_certificate_notifications(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let certificate_id = parse_id("certificate", &id)?;
    if state.metadata.get_certificate(certificate_id).await?.is_none() {
        return Err(ApiError::NotFound("certificate not found".to_string()));
    }

    let rows = state
        .metadata
        .list_notifications_for_certificate(certificate_id)
        .await?;
    let response: ApiResult<Vec<NotificationResponse>> =
        rows.into_iter().map(NotificationResponse::try_from).collect();
    Ok(Json(response?))
}
