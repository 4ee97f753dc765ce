//! SQL inventory source.

use crate::error::{SourceError, SourceResult};
use crate::{CertificateSource, SourceBatch};
use async_trait::async_trait;
use portall_core::config::SqlSourceConfig;
use portall_core::{RawCertificate, SyncSource};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Column, Row, ValueRef};
use std::collections::HashSet;
use std::time::Duration;

/// Runs a configured SELECT against an external database.
///
/// Column names follow the inventory schema (`serial_number`, `kdb_label`,
/// `kdb_file_path`, ...). Missing optional columns are tolerated. Text columns
/// must come back as text, UTF-8 bytes or numbers; cast native timestamp
/// columns in the query (`valid_to::text`). A row holding any other non-null
/// value is counted as malformed rather than read as empty.
pub struct SqlSource {
    config: SqlSourceConfig,
}

impl SqlSource {
    pub fn new(config: SqlSourceConfig) -> Self {
        sqlx::any::install_default_drivers();
        Self { config }
    }

    async fn run_query(&self, url: &str) -> SourceResult<Vec<AnyRow>> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .map_err(|e| SourceError::Unreachable(format!("sql connect failed: {e}")))?;

        let result = tokio::time::timeout(
            timeout,
            sqlx::query(&self.config.query).fetch_all(&pool),
        )
        .await;
        pool.close().await;

        match result {
            Ok(rows) => Ok(rows?),
            Err(_) => Err(SourceError::Timeout(self.config.timeout_secs)),
        }
    }
}

#[async_trait]
impl CertificateSource for SqlSource {
    fn source(&self) -> SyncSource {
        SyncSource::Sql
    }

    async fn fetch(&self) -> SourceResult<SourceBatch> {
        let url = self.config.url.resolve().ok_or_else(|| {
            SourceError::MissingCredential(format!(
                "sql source url ({}) is not set",
                self.config.url.describe()
            ))
        })?;

        let rows = self.run_query(&url).await?;
        tracing::debug!(rows = rows.len(), "SQL source returned rows");

        let mut batch = SourceBatch::default();
        for row in &rows {
            match raw_from_row(row, self.config.kind) {
                Ok(raw) => batch.rows.push(raw),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed SQL row");
                    batch.malformed += 1;
                }
            }
        }
        Ok(batch)
    }
}

fn raw_from_row(row: &AnyRow, kind: portall_core::CertificateKind) -> SourceResult<RawCertificate> {
    let columns: HashSet<String> = row
        .columns()
        .iter()
        .map(|c| c.name().to_ascii_lowercase())
        .collect();
    let text = |names: &[&str]| -> SourceResult<Option<String>> {
        for name in names.iter().filter(|name| columns.contains(**name)) {
            if let Some(value) = column_text(row, name)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    };
    let flag = |name: &str| -> Option<bool> {
        if !columns.contains(name) {
            return None;
        }
        row.try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<i64>, _>(name)
                    .ok()
                    .flatten()
                    .map(|v| v != 0)
            })
    };

    Ok(RawCertificate {
        kind,
        serial_number: text(&["serial_number", "serial"])?,
        common_name: text(&["common_name"])?,
        alias: text(&["kdb_label", "alias"])?,
        subject: text(&["subject"])?,
        issuer: text(&["issuer"])?,
        server_hostname: text(&["server_hostname", "hostname"])?,
        application_name: text(&["application_name"])?,
        environment: text(&["environment"])?,
        keystore_path: text(&["kdb_file_path", "keystore_path"])?,
        keystore_type: text(&["keystore_type"])?,
        signature_algorithm: text(&["signature_algorithm"])?,
        fingerprint_sha256: text(&["fingerprint_sha256"])?,
        valid_from: text(&["valid_from"])?,
        valid_to: text(&["valid_to"])?,
        external_id: text(&["external_id"])?,
        is_active: flag("is_active"),
        is_monitored: flag("is_monitored"),
    })
}

/// Read a column as text, accepting UTF-8 bytes, integer and float columns too.
fn column_text(row: &AnyRow, name: &str) -> SourceResult<Option<String>> {
    let is_null = row
        .try_get_raw(name)
        .map(|value| value.is_null())
        .unwrap_or(true);
    if is_null {
        return Ok(None);
    }

    if let Ok(value) = row.try_get::<String, _>(name) {
        return Ok(Some(value));
    }
    if let Ok(value) = row.try_get::<i64, _>(name) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<f64, _>(name) {
        return Ok(Some(format!("{}", value.trunc() as i64)));
    }
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>(name)
        && let Ok(value) = String::from_utf8(bytes)
    {
        return Ok(Some(value));
    }
    Err(SourceError::Malformed(format!(
        "column '{name}' is not text or a number; cast it in the query"
    )))
}
