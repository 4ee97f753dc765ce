//! Test fixtures for generating test data.

use async_trait::async_trait;
use portall_core::{CertificateKind, DutyEntry, RawCertificate, SyncSource};
use portall_sources::{
    CertificateSource, DutyBatch, DutyRosterSource, SourceBatch, SourceError, SourceResult,
};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Secret whose hash is `AdminConfig::for_testing().session_hash`.
#[allow(dead_code)]
pub const ADMIN_SECRET: &str = "test-admin-secret";

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A raw KDB certificate with a serial, expiring `days` from now.
#[allow(dead_code)]
pub fn raw_cert(serial: &str, host: &str, days: i64) -> RawCertificate {
    let valid_to = (OffsetDateTime::now_utc() + time::Duration::days(days))
        .replace_nanosecond(0)
        .unwrap();
    RawCertificate {
        kind: CertificateKind::Kdb,
        serial_number: Some(serial.to_string()),
        common_name: Some(format!("{serial}.example.com")),
        server_hostname: Some(host.to_string()),
        environment: Some("prod".to_string()),
        valid_to: valid_to.format(&Rfc3339).ok(),
        ..Default::default()
    }
}

/// A raw certificate whose expiry cannot be parsed.
#[allow(dead_code)]
pub fn raw_cert_bad_expiry(serial: &str, host: &str) -> RawCertificate {
    RawCertificate {
        valid_to: Some("sometime next year".to_string()),
        ..raw_cert(serial, host, 0)
    }
}

/// In-memory certificate source. Returns its rows, or fails when told to.
#[allow(dead_code)]
pub struct FakeSource {
    source: SyncSource,
    rows: Mutex<Vec<RawCertificate>>,
    failure: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new(source: SyncSource, rows: Vec<RawCertificate>) -> Self {
        Self {
            source,
            rows: Mutex::new(rows),
            failure: Mutex::new(None),
        }
    }

    pub fn failing(source: SyncSource, reason: &str) -> Self {
        let fake = Self::new(source, Vec::new());
        fake.set_failure(Some(reason));
        fake
    }

    pub fn set_rows(&self, rows: Vec<RawCertificate>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock().unwrap() = reason.map(str::to_string);
    }
}

#[async_trait]
impl CertificateSource for FakeSource {
    fn source(&self) -> SyncSource {
        self.source
    }

    async fn fetch(&self) -> SourceResult<SourceBatch> {
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(SourceError::Unreachable(reason));
        }
        Ok(SourceBatch {
            rows: self.rows.lock().unwrap().clone(),
            malformed: 0,
            warnings: Vec::new(),
        })
    }
}

/// A roster entry with only a date and a name.
#[allow(dead_code)]
pub fn duty(duty_date: time::Date, name: &str) -> DutyEntry {
    DutyEntry {
        duty_date,
        name: name.to_string(),
        phone: None,
        email: None,
        notes: None,
    }
}

/// In-memory roster feed.
#[allow(dead_code)]
pub struct FakeDutySource {
    entries: Mutex<Vec<DutyEntry>>,
    rejected: u64,
}

#[allow(dead_code)]
impl FakeDutySource {
    pub fn new(entries: Vec<DutyEntry>, rejected: u64) -> Self {
        Self {
            entries: Mutex::new(entries),
            rejected,
        }
    }

    pub fn set_entries(&self, entries: Vec<DutyEntry>) {
        *self.entries.lock().unwrap() = entries;
    }
}

#[async_trait]
impl DutyRosterSource for FakeDutySource {
    fn describe(&self) -> String {
        "memory://roster".to_string()
    }

    async fn fetch(&self) -> SourceResult<DutyBatch> {
        Ok(DutyBatch {
            entries: self.entries.lock().unwrap().clone(),
            rejected: self.rejected,
        })
    }
}
