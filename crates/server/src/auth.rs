//! Session authentication, CSRF checks and request tracing.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::middleware::Next;
use axum::response::Response;
use portall_core::{CSRF_HEADER, SESSION_COOKIE, Session, SessionId, SessionScope};
use portall_metadata::models::SessionRow;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    ///
    /// Truncated by character count (not bytes) and reduced to printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the caller presented its session secret.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// Browser cookie; unsafe methods need the CSRF header.
    Cookie,
    /// `Authorization: Bearer`; exempt from CSRF.
    Bearer,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cookie => "cookie",
            Self::Bearer => "bearer",
        }
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub session: Session,
    pub method: AuthMethod,
}

impl AuthenticatedUser {
    pub fn has_scope(&self, scope: SessionScope) -> bool {
        self.session.has_scope(scope)
    }

    /// Require a specific scope, returning an error if not present.
    pub fn require_scope(&self, scope: SessionScope) -> ApiResult<()> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "missing required scope: {scope}"
            )))
        }
    }

    /// Username recorded as owner on content the caller creates.
    pub fn username(&self) -> &str {
        &self.session.username
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

/// Find the session cookie among every `Cookie` header.
fn extract_session_cookie(req: &Request) -> Option<&str> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Hash a session secret for storage lookup.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Random 256-bit value, hex encoded. Used for session secrets and CSRF tokens.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Rebuild a [`Session`] from its stored row. Unknown scopes are dropped.
pub fn session_from_row(row: &SessionRow) -> ApiResult<Session> {
    let scopes: Vec<String> = serde_json::from_str(&row.scopes)
        .map_err(|e| ApiError::Internal(format!("invalid session scopes: {e}")))?;

    let scopes: HashSet<SessionScope> = scopes
        .iter()
        .filter_map(|s| match SessionScope::parse(s) {
            Ok(scope) => Some(scope),
            Err(_) => {
                tracing::warn!(
                    session_id = %row.session_id,
                    invalid_scope = %s,
                    "Session contains invalid scope, ignoring"
                );
                None
            }
        })
        .collect();

    Ok(Session {
        id: SessionId::from_uuid(row.session_id),
        username: row.username.clone(),
        scopes,
        csrf_token: row.csrf_token.clone(),
        expires_at: row.expires_at,
        revoked_at: row.revoked_at,
        created_at: row.created_at,
    })
}

/// Authentication middleware.
///
/// Resolves the session from the bearer token or the session cookie, enforces
/// the CSRF header for cookie sessions on unsafe methods, and runs the rest of
/// the request inside a span carrying the trace ID. Requests without
/// credentials pass through; handlers decide whether they need a session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    let credential = match extract_bearer_token(&req) {
        Some(secret) => Some((secret.to_string(), AuthMethod::Bearer)),
        None => extract_session_cookie(&req).map(|s| (s.to_string(), AuthMethod::Cookie)),
    };

    if let Some((secret, method)) = credential {
        let row = state
            .metadata
            .get_session_by_hash(&hash_secret(&secret))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("unknown session".to_string()))?;
        let session = session_from_row(&row)?;

        if !session.is_valid() {
            return Err(ApiError::Unauthorized(
                "session expired or revoked".to_string(),
            ));
        }

        if method == AuthMethod::Cookie && is_state_changing(req.method()) {
            let presented = req
                .headers()
                .get(CSRF_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if presented.is_empty() || presented != session.csrf_token {
                tracing::warn!(
                    parent: &span,
                    session_id = %session.id,
                    method = %req.method(),
                    "CSRF token missing or mismatched"
                );
                return Err(ApiError::Forbidden("invalid CSRF token".to_string()));
            }
        }

        // Update last seen time (fire and forget)
        let metadata = state.metadata.clone();
        let session_id = row.session_id;
        tokio::spawn(async move {
            let _ = metadata
                .touch_session(session_id, OffsetDateTime::now_utc())
                .await;
        });

        req.extensions_mut()
            .insert(AuthenticatedUser { session, method });
    }

    Ok(next.run(req).instrument(span).await)
}

/// Require authentication (session must be present).
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}
