//! On-call roster endpoints (read only; written by the duty sync job).

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::format_time;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, Request, State};
use portall_core::{SessionScope, days_until_duty};
use portall_metadata::models::DutyRow;
use portall_metadata::repos::DutyRepo;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

const DEFAULT_SPAN_DAYS: i64 = 30;
const MAX_SPAN_DAYS: i64 = 366;

#[derive(Debug, Serialize)]
pub struct DutyResponse {
    pub date: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    /// Whole days from today; 0 for today's duty.
    pub days_until: Option<i64>,
    pub source: String,
    pub synced_at: String,
}

impl DutyResponse {
    fn from_row(row: DutyRow, today: Date) -> ApiResult<Self> {
        Ok(Self {
            date: format_date(row.duty_date),
            days_until: days_until_duty(row.duty_date, today),
            synced_at: format_time(row.synced_at)?,
            name: row.name,
            phone: row.phone,
            email: row.email,
            notes: row.notes,
            source: row.source,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentDutyResponse {
    pub date: String,
    pub current: Option<DutyResponse>,
    pub next: Option<DutyResponse>,
}

fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

fn parse_date(field: &'static str, value: &str) -> ApiResult<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| ApiError::validation(field, "must be a YYYY-MM-DD date"))
}

/// GET /v1/duty/current - Today's duty and the next one after it.
pub async fn current_duty(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<CurrentDutyResponse>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let today = OffsetDateTime::now_utc().date();
    let current = state.metadata.get_duty(today).await?;
    let next = state.metadata.next_duty_after(today).await?;

    Ok(Json(CurrentDutyResponse {
        date: format_date(today),
        current: current
            .map(|row| DutyResponse::from_row(row, today))
            .transpose()?,
        next: next
            .map(|row| DutyResponse::from_row(row, today))
            .transpose()?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListDutiesParams {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// GET /v1/duty - Roster entries in `[from, to]`, today plus 30 days by default.
pub async fn list_duties(
    State(state): State<AppState>,
    Query(params): Query<ListDutiesParams>,
    req: Request,
) -> ApiResult<Json<Vec<DutyResponse>>> {
    let auth = require_auth(&req)?;
    auth.require_scope(SessionScope::PortalRead)?;

    let today = OffsetDateTime::now_utc().date();
    let from = match params.from.as_deref() {
        Some(value) => parse_date("from", value)?,
        None => today,
    };
    let to = match params.to.as_deref() {
        Some(value) => parse_date("to", value)?,
        None => from + Duration::days(DEFAULT_SPAN_DAYS),
    };
    if to < from {
        return Err(ApiError::validation("to", "must not be before from"));
    }
    if (to - from).whole_days() > MAX_SPAN_DAYS {
        return Err(ApiError::validation(
            "to",
            format!("range must not exceed {MAX_SPAN_DAYS} days"),
        ));
    }

    let rows = state.metadata.list_duties(from, to).await?;
    let response: ApiResult<Vec<DutyResponse>> = rows
        .into_iter()
        .map(|row| DutyResponse::from_row(row, today))
        .collect();
    Ok(Json(response?))
}
