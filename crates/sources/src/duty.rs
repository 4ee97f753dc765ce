//! On-call roster feed.
//!
//! The roster is a spreadsheet export published over HTTP, either as CSV with
//! a header row or as a JSON array of objects. Column names are matched
//! case-insensitively in English or as the upstream export spells them.

use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use portall_core::config::DutySourceConfig;
use portall_core::{DutyEntry, DutyFormat};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Entries fetched from the roster feed in one run.
#[derive(Debug, Default)]
pub struct DutyBatch {
    pub entries: Vec<DutyEntry>,
    /// Rows without a usable date or name.
    pub rejected: u64,
}

/// Where the on-call roster comes from.
#[async_trait]
pub trait DutyRosterSource: Send + Sync {
    /// Recorded as the `source` of every stored entry.
    fn describe(&self) -> String;

    async fn fetch(&self) -> SourceResult<DutyBatch>;
}

const DATE_COLUMNS: &[&str] = &["date", "tarih"];
const NAME_COLUMNS: &[&str] = &["name", "ad_soyad"];
const PHONE_COLUMNS: &[&str] = &["phone", "telefon"];
const EMAIL_COLUMNS: &[&str] = &["email"];
const NOTES_COLUMNS: &[&str] = &["notes", "notlar"];

/// Fetches the roster with `GET {url}`, sending a bearer token when one is
/// configured.
pub struct HttpDutySource {
    config: DutySourceConfig,
    http: reqwest::Client,
}

impl HttpDutySource {
    pub fn new(config: DutySourceConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl DutyRosterSource for HttpDutySource {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    async fn fetch(&self) -> SourceResult<DutyBatch> {
        let url = &self.config.url;
        let accept = match self.config.format {
            DutyFormat::Csv => "text/csv",
            DutyFormat::Json => "application/json",
        };
        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, accept);
        if let Some(token) = &self.config.token {
            let value = token.resolve().ok_or_else(|| {
                SourceError::MissingCredential(format!(
                    "duty feed token ({}) is not set",
                    token.describe()
                ))
            })?;
            request = request.bearer_auth(value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(self.config.timeout_secs)
            } else {
                SourceError::Unreachable(format!("GET {url}: {e}"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Auth(format!("duty feed rejected token ({status})")));
        }
        if !status.is_success() {
            return Err(SourceError::Unreachable(format!("GET {url} returned {status}")));
        }

        let body = response.text().await?;
        let batch = parse_roster(&body, self.config.format)?;
        tracing::debug!(
            format = self.config.format.as_str(),
            entries = batch.entries.len(),
            rejected = batch.rejected,
            "Duty roster fetched"
        );
        Ok(batch)
    }
}

/// Parse a roster body. A body that cannot be read as the format at all is an
/// error; individual bad rows are only counted.
pub fn parse_roster(body: &str, format: DutyFormat) -> SourceResult<DutyBatch> {
    let records = match format {
        DutyFormat::Csv => csv_records(body)?,
        DutyFormat::Json => json_records(body)?,
    };

    let mut batch = DutyBatch::default();
    for record in records {
        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| record.get(*name).map(String::as_str))
        };
        match DutyEntry::from_fields(
            field(DATE_COLUMNS),
            field(NAME_COLUMNS),
            field(PHONE_COLUMNS),
            field(EMAIL_COLUMNS),
            field(NOTES_COLUMNS),
        ) {
            Ok(entry) => batch.entries.push(entry),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping roster row");
                batch.rejected += 1;
            }
        }
    }
    Ok(batch)
}

type Record = HashMap<String, String>;

fn normalize_column(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn require_columns(columns: &[String]) -> SourceResult<()> {
    for (label, names) in [("date", DATE_COLUMNS), ("name", NAME_COLUMNS)] {
        if !names.iter().any(|n| columns.iter().any(|c| c == n)) {
            return Err(SourceError::Malformed(format!(
                "roster has no {label} column (expected one of {})",
                names.join(", ")
            )));
        }
    }
    Ok(())
}

fn csv_records(body: &str) -> SourceResult<Vec<Record>> {
    let mut rows = split_csv(body)?.into_iter();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| SourceError::Malformed("roster is empty".to_string()))?
        .iter()
        .map(|c| normalize_column(c))
        .collect();
    require_columns(&header)?;

    Ok(rows
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| header.iter().cloned().zip(row).collect())
        .collect())
}

/// Split comma-separated text into rows of cells. Double-quoted cells may hold
/// commas, line breaks and `""` escapes.
fn split_csv(body: &str) -> SourceResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' if cell.trim().is_empty() => {
                cell.clear();
                in_quotes = true;
            }
            ',' => row.push(std::mem::take(&mut cell)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(c),
        }
    }
    if in_quotes {
        return Err(SourceError::Malformed("unterminated quoted field".to_string()));
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }
    Ok(rows)
}

fn json_records(body: &str) -> SourceResult<Vec<Record>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SourceError::Malformed(format!("roster is not JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(SourceError::Malformed("roster must be a JSON array".to_string()));
    };

    let records: Vec<Record> = items
        .iter()
        .map(|item| {
            let Value::Object(map) = item else {
                return Record::new();
            };
            map.iter()
                .filter_map(|(key, value)| {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => return None,
                    };
                    Some((normalize_column(key), text))
                })
                .collect()
        })
        .collect();
    Ok(records)
}
