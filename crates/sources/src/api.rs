//! Vendor certificate-management API source.

use crate::error::{SourceError, SourceResult};
use crate::{CertificateSource, SourceBatch};
use async_trait::async_trait;
use portall_core::config::ApiSourceConfig;
use portall_core::{CertificateKind, RawCertificate, SyncSource};
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value};
use std::time::Duration;

/// Pulls certificates from `GET {base_url}{path}` with an API-key header.
///
/// The body is either a JSON array of certificates or an object with a
/// `certificates` array and an optional `next` URL for the following page.
pub struct ApiSource {
    config: ApiSourceConfig,
    http: reqwest::Client,
}

impl ApiSource {
    pub fn new(config: ApiSourceConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    fn first_page_url(&self) -> SourceResult<Url> {
        let raw = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| SourceError::Unreachable(format!("invalid API URL {raw}: {e}")))
    }

    async fn fetch_page(&self, url: Url, api_key: &str) -> SourceResult<Value> {
        let response = self
            .http
            .get(url.clone())
            .header(self.config.api_key_header.as_str(), api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(self.config.timeout_secs)
                } else {
                    SourceError::Unreachable(format!("GET {url}: {e}"))
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Auth(format!("API rejected key ({status})")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Unreachable(format!(
                "GET {url} returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| SourceError::Malformed(format!("page is not JSON: {e}")))
    }
}

#[async_trait]
impl CertificateSource for ApiSource {
    fn source(&self) -> SyncSource {
        SyncSource::Api
    }

    async fn fetch(&self) -> SourceResult<SourceBatch> {
        let api_key = self.config.api_key.resolve().ok_or_else(|| {
            SourceError::MissingCredential(format!(
                "api key ({}) is not set",
                self.config.api_key.describe()
            ))
        })?;

        let mut batch = SourceBatch::default();
        let mut next = Some(self.first_page_url()?);
        let mut pages = 0u32;

        while let Some(url) = next.take() {
            if pages >= self.config.max_pages {
                let warning = format!(
                    "stopped after {} pages; more results remain",
                    self.config.max_pages
                );
                tracing::warn!(max_pages = self.config.max_pages, "API pagination limit reached");
                batch.warnings.push(warning);
                break;
            }
            pages += 1;

            let page = self.fetch_page(url.clone(), &api_key).await?;
            let (items, next_link) = split_page(page)?;
            for item in items {
                match vendor_certificate(&item) {
                    Ok(raw) => batch.rows.push(raw),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping malformed API certificate");
                        batch.malformed += 1;
                    }
                }
            }

            next = match next_link {
                Some(link) => Some(url.join(&link).map_err(|e| {
                    SourceError::Malformed(format!("invalid next link '{link}': {e}"))
                })?),
                None => None,
            };
        }

        tracing::debug!(
            pages,
            rows = batch.rows.len(),
            malformed = batch.malformed,
            "API source fetched"
        );
        Ok(batch)
    }
}

/// Attribute names per field, tried in order. The first non-null one wins,
/// so payloads carrying both a canonical and a vendor name still map.
const SERIAL_KEYS: &[&str] = &["serial_number", "serial"];
const COMMON_NAME_KEYS: &[&str] = &["common_name", "cn"];
const ALIAS_KEYS: &[&str] = &["alias", "kdb_label", "alias_name", "label"];
const HOSTNAME_KEYS: &[&str] = &["server_hostname", "hostname", "server"];
const APPLICATION_KEYS: &[&str] = &["application_name", "application", "java_application"];
const KEYSTORE_PATH_KEYS: &[&str] = &["keystore_path", "kdb_file_path", "path"];
const FINGERPRINT_KEYS: &[&str] = &["fingerprint_sha256", "sha256_fingerprint", "fingerprint"];
const VALID_FROM_KEYS: &[&str] = &["valid_from", "not_before"];
const VALID_TO_KEYS: &[&str] = &["valid_to", "not_after", "expiry", "expires_at"];
const EXTERNAL_ID_KEYS: &[&str] = &["external_id", "appviewx_id", "id"];

/// Map one vendor item onto a raw certificate.
///
/// Text fields accept strings or numbers (vendor ids are often numeric).
/// Anything else in a known field makes the whole item malformed.
fn vendor_certificate(item: &Value) -> SourceResult<RawCertificate> {
    let Value::Object(map) = item else {
        return Err(SourceError::Malformed(
            "certificate is not an object".to_string(),
        ));
    };

    let kind = match text(map, &["kind"])? {
        Some(kind) => CertificateKind::parse(&kind)
            .map_err(|e| SourceError::Malformed(e.to_string()))?,
        None => CertificateKind::default(),
    };

    Ok(RawCertificate {
        kind,
        serial_number: text(map, SERIAL_KEYS)?,
        common_name: text(map, COMMON_NAME_KEYS)?,
        alias: text(map, ALIAS_KEYS)?,
        subject: text(map, &["subject"])?,
        issuer: text(map, &["issuer"])?,
        server_hostname: text(map, HOSTNAME_KEYS)?,
        application_name: text(map, APPLICATION_KEYS)?,
        environment: text(map, &["environment"])?,
        keystore_path: text(map, KEYSTORE_PATH_KEYS)?,
        keystore_type: text(map, &["keystore_type"])?,
        signature_algorithm: text(map, &["signature_algorithm"])?,
        fingerprint_sha256: text(map, FINGERPRINT_KEYS)?,
        valid_from: text(map, VALID_FROM_KEYS)?,
        valid_to: text(map, VALID_TO_KEYS)?,
        external_id: text(map, EXTERNAL_ID_KEYS)?,
        is_active: flag(map, "is_active")?,
        is_monitored: flag(map, "is_monitored")?,
    })
}

fn first_present<'a, 'k>(
    map: &'a Map<String, Value>,
    keys: &[&'k str],
) -> Option<(&'k str, &'a Value)> {
    keys.iter().find_map(|key| {
        map.get(*key)
            .filter(|value| !value.is_null())
            .map(|value| (*key, value))
    })
}

fn text(map: &Map<String, Value>, keys: &[&str]) -> SourceResult<Option<String>> {
    match first_present(map, keys) {
        None => Ok(None),
        Some((_, Value::String(value))) => Ok(Some(value.clone())),
        Some((_, Value::Number(value))) => Ok(Some(value.to_string())),
        Some((key, other)) => Err(SourceError::Malformed(format!(
            "'{key}' must be a string or number, got {other}"
        ))),
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> SourceResult<Option<bool>> {
    match first_present(map, &[key]) {
        None => Ok(None),
        Some((_, Value::Bool(value))) => Ok(Some(*value)),
        Some((key, other)) => Err(SourceError::Malformed(format!(
            "'{key}' must be a boolean, got {other}"
        ))),
    }
}

/// Split a page into its items and the `next` link.
fn split_page(page: Value) -> SourceResult<(Vec<Value>, Option<String>)> {
    match page {
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut map) => {
            let items = match map.remove("certificates") {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(SourceError::Malformed(
                        "'certificates' is not an array".to_string(),
                    ));
                }
                None => {
                    return Err(SourceError::Malformed(
                        "response has no 'certificates' array".to_string(),
                    ));
                }
            };
            let next = match map.remove("next") {
                Some(Value::String(link)) if !link.is_empty() => Some(link),
                _ => None,
            };
            Ok((items, next))
        }
        _ => Err(SourceError::Malformed(
            "expected a JSON array or object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_page_shapes() {
        let (items, next) = split_page(json!([{"serial": "01"}])).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(next, None);

        let (items, next) =
            split_page(json!({"certificates": [], "next": "/certificates?page=2"})).unwrap();
        assert!(items.is_empty());
        assert_eq!(next.as_deref(), Some("/certificates?page=2"));

        let (_, next) = split_page(json!({"certificates": [], "next": null})).unwrap();
        assert_eq!(next, None);

        assert!(split_page(json!({"items": []})).is_err());
        assert!(split_page(json!("nope")).is_err());
    }

    #[test]
    fn test_vendor_certificate_prefers_canonical_names() {
        let raw = vendor_certificate(&json!({
            "kind": "java",
            "id": 17,
            "appviewx_id": "avx-17",
            "hostname": "legacy01",
            "server_hostname": "app01",
            "serial": "0A",
            "serial_number": "0B",
            "expiry": "2026-01-01",
            "valid_to": "2026-02-01",
            "alias_name": "server_cert"
        }))
        .unwrap();
        assert_eq!(raw.kind, CertificateKind::Java);
        assert_eq!(raw.external_id.as_deref(), Some("avx-17"));
        assert_eq!(raw.server_hostname.as_deref(), Some("app01"));
        assert_eq!(raw.serial_number.as_deref(), Some("0B"));
        assert_eq!(raw.valid_to.as_deref(), Some("2026-02-01"));
        assert_eq!(raw.alias.as_deref(), Some("server_cert"));
    }

    #[test]
    fn test_vendor_certificate_accepts_numeric_ids() {
        let raw = vendor_certificate(&json!({"id": 17, "serial": 255, "external_id": null})).unwrap();
        assert_eq!(raw.external_id.as_deref(), Some("17"));
        assert_eq!(raw.serial_number.as_deref(), Some("255"));
        assert_eq!(raw.kind, CertificateKind::Kdb);
    }

    #[test]
    fn test_vendor_certificate_rejects_bad_shapes() {
        assert!(vendor_certificate(&json!("0A")).is_err());
        assert!(vendor_certificate(&json!({"kind": "pem"})).is_err());
        assert!(vendor_certificate(&json!({"serial": ["0A"]})).is_err());
        assert!(vendor_certificate(&json!({"is_active": "maybe"})).is_err());
    }
}
