//! Health and identity endpoints.

use crate::auth::require_auth;
use crate::error::ApiResult;
use crate::handlers::common::format_time_opt;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated so load balancers and liveness checks can call it. Reports only
/// status and version.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Response for the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub session_id: String,
    pub username: String,
    pub scopes: Vec<String>,
    pub auth_method: &'static str,
    /// Browser clients echo this in `X-CSRF-Token`.
    pub csrf_token: String,
    pub expires_at: Option<String>,
}

/// GET /v1/auth/whoami - Return session identity.
pub async fn whoami(req: Request) -> ApiResult<Json<WhoamiResponse>> {
    let auth = require_auth(&req)?;
    let session = &auth.session;

    let mut scopes: Vec<String> = session
        .scopes
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    scopes.sort();

    Ok(Json(WhoamiResponse {
        session_id: session.id.to_string(),
        username: session.username.clone(),
        scopes,
        auth_method: auth.method.as_str(),
        csrf_token: session.csrf_token.clone(),
        expires_at: format_time_opt(session.expires_at)?,
    }))
}
