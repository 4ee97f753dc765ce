//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Read and decode a JSON request body of at most `limit` bytes.
pub async fn read_json<T: DeserializeOwned>(req: Request, limit: usize) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Parse a path identifier.
pub fn parse_id(entity: &str, raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid {entity} ID: {e}")))
}

/// Format a timestamp as RFC 3339.
pub fn format_time(ts: OffsetDateTime) -> ApiResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

pub fn format_time_opt(ts: Option<OffsetDateTime>) -> ApiResult<Option<String>> {
    ts.map(format_time).transpose()
}

/// Parse an RFC 3339 timestamp from a request field.
pub fn parse_time(field: &str, value: &str) -> ApiResult<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| ApiError::validation(field, format!("expected an RFC 3339 timestamp: {e}")))
}

pub fn parse_time_opt(field: &str, value: Option<&str>) -> ApiResult<Option<OffsetDateTime>> {
    value.map(|v| parse_time(field, v)).transpose()
}

/// Trim an optional text field, mapping blank to `None`.
pub fn clean_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_reports_field() {
        let err = parse_time("expires_at", "tomorrow").unwrap_err();
        assert_eq!(err.field(), Some("expires_at"));
        assert!(parse_time("expires_at", "2026-03-01T10:00:00Z").is_ok());
    }

    #[test]
    fn test_clean_opt() {
        assert_eq!(clean_opt(Some("  ".to_string())), None);
        assert_eq!(clean_opt(Some(" a ".to_string())), Some("a".to_string()));
    }
}
