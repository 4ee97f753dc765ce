//! Certificate records and normalization of raw source rows.
//!
//! Every connector hands back loosely typed [`RawCertificate`] values. The
//! normalizer turns them into a [`CertificateRecord`] with a stable natural
//! key, a canonical serial number and a parsed expiry. A record whose expiry
//! cannot be parsed is still produced, but with `valid_to = None` and the parse
//! failure in `expiry_error`, so the sync job can persist and report it while
//! the alert evaluator skips it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Certificate container family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CertificateKind {
    /// IBM key database (GSKit `.kdb`).
    #[default]
    Kdb,
    /// Java keystore (JKS, PKCS12 or JCEKS).
    Java,
}

impl CertificateKind {
    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kdb" => Ok(Self::Kdb),
            "java" => Ok(Self::Java),
            other => Err(Error::validation(
                "kind",
                format!("unknown certificate kind: {other}"),
            )),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kdb => "kdb",
            Self::Java => "java",
        }
    }
}

impl fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which connector last reported a certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    /// External SQL inventory database.
    Sql,
    /// Vendor certificate-management API.
    Api,
    /// Keystores read over SSH.
    Ssh,
}

impl SyncSource {
    /// All sources, in the order a sync run visits them.
    pub const ALL: [SyncSource; 3] = [Self::Sql, Self::Api, Self::Ssh];

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "sql" => Ok(Self::Sql),
            "api" => Ok(Self::Api),
            "ssh" => Ok(Self::Ssh),
            other => Err(Error::validation(
                "source",
                format!("unknown sync source: {other}"),
            )),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Api => "api",
            Self::Ssh => "ssh",
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A certificate as reported by a source, before normalization.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RawCertificate {
    pub kind: CertificateKind,
    pub serial_number: Option<String>,
    pub common_name: Option<String>,
    pub alias: Option<String>,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub server_hostname: Option<String>,
    pub application_name: Option<String>,
    pub environment: Option<String>,
    pub keystore_path: Option<String>,
    pub keystore_type: Option<String>,
    pub signature_algorithm: Option<String>,
    pub fingerprint_sha256: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub external_id: Option<String>,
    pub is_active: Option<bool>,
    pub is_monitored: Option<bool>,
}

/// A normalized certificate, ready to be upserted by natural key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateRecord {
    /// Natural key; one row per key across all sources.
    pub cert_key: String,
    pub kind: CertificateKind,
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
    pub fingerprint_sha256: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
    /// Why `valid_to` is missing, when it is.
    pub expiry_error: Option<String>,
    pub source: SyncSource,
    pub external_id: Option<String>,
    pub is_active: bool,
    pub is_monitored: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_synced_at: OffsetDateTime,
}

impl CertificateRecord {
    /// A record without a usable expiry is excluded from alerting.
    pub fn is_invalid(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Calendar days until expiry, or `None` for invalid records.
    pub fn days_until_expiry(&self, now: OffsetDateTime) -> Option<i64> {
        self.valid_to.map(|valid_to| crate::alert::days_until(valid_to, now))
    }

    /// Expired once `now` is past `valid_to`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.valid_to.is_some_and(|valid_to| now > valid_to)
    }
}

/// Normalize a raw source row into a [`CertificateRecord`].
///
/// Returns an error for malformed rows (no usable identity). An unparseable
/// expiry does not fail normalization.
pub fn normalize(
    raw: RawCertificate,
    source: SyncSource,
    now: OffsetDateTime,
) -> Result<CertificateRecord> {
    let serial_number = raw
        .serial_number
        .as_deref()
        .and_then(normalize_serial);
    let server_hostname = clean(raw.server_hostname).map(|h| h.to_ascii_lowercase());
    let alias = clean(raw.alias);
    let subject = clean(raw.subject);

    let cert_key = natural_key(
        raw.kind,
        serial_number.as_deref(),
        server_hostname.as_deref(),
        alias.as_deref(),
    )
    .ok_or_else(|| {
        Error::InvalidCertificate(
            "record has neither a serial number nor a host and alias".to_string(),
        )
    })?;

    let common_name = clean(raw.common_name)
        .or_else(|| subject.as_deref().and_then(common_name_from_subject))
        .or_else(|| alias.clone())
        .ok_or_else(|| {
            Error::InvalidCertificate(format!("record {cert_key} has no common name"))
        })?;

    let keystore_path = clean(raw.keystore_path);
    let keystore_type = clean(raw.keystore_type)
        .map(|t| t.to_ascii_uppercase())
        .or_else(|| Some(default_keystore_type(raw.kind, keystore_path.as_deref()).to_string()));

    let valid_from = clean(raw.valid_from).and_then(|v| parse_timestamp(&v).ok());
    let (valid_to, expiry_error) = match clean(raw.valid_to) {
        Some(value) => match parse_timestamp(&value) {
            Ok(ts) => (Some(ts), None),
            Err(e) => (None, Some(e.to_string())),
        },
        None => (None, Some("expiry timestamp missing".to_string())),
    };

    Ok(CertificateRecord {
        cert_key,
        kind: raw.kind,
        common_name,
        serial_number,
        alias,
        subject,
        issuer: clean(raw.issuer),
        server_hostname,
        application_name: clean(raw.application_name),
        environment: clean(raw.environment).map(|e| e.to_ascii_lowercase()),
        keystore_path,
        keystore_type,
        signature_algorithm: clean(raw.signature_algorithm),
        fingerprint_sha256: clean(raw.fingerprint_sha256).map(|f| f.to_ascii_uppercase()),
        valid_from,
        valid_to,
        expiry_error,
        source,
        external_id: clean(raw.external_id),
        is_active: raw.is_active.unwrap_or(true),
        is_monitored: raw.is_monitored.unwrap_or(true),
        last_synced_at: now,
    })
}

/// Build the natural key: `kind:SERIAL`, else `kind:host:alias`.
pub fn natural_key(
    kind: CertificateKind,
    serial: Option<&str>,
    host: Option<&str>,
    alias: Option<&str>,
) -> Option<String> {
    if let Some(serial) = serial.filter(|s| !s.is_empty()) {
        return Some(format!("{}:{serial}", kind.as_str()));
    }
    match (host, alias) {
        (Some(host), Some(alias)) if !host.is_empty() && !alias.is_empty() => Some(format!(
            "{}:{}:{}",
            kind.as_str(),
            host.to_ascii_lowercase(),
            alias.to_ascii_lowercase()
        )),
        _ => None,
    }
}

/// Canonical serial: uppercase hex, no separators, no leading zeros.
pub fn normalize_serial(serial: &str) -> Option<String> {
    let trimmed = serial.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.is_empty() {
        return None;
    }
    let stripped = compact.trim_start_matches('0');
    Some(if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    })
}

/// Extract the `CN=` component of a distinguished name.
pub fn common_name_from_subject(subject: &str) -> Option<String> {
    subject
        .split(',')
        .map(str::trim)
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("cn")
                .then(|| value.trim().to_string())
        })
        .filter(|cn| !cn.is_empty())
}

fn default_keystore_type(kind: CertificateKind, path: Option<&str>) -> &'static str {
    match kind {
        CertificateKind::Kdb => "KDB",
        CertificateKind::Java => {
            let path = path.unwrap_or_default().to_ascii_lowercase();
            if path.ends_with(".p12") || path.ends_with(".pfx") {
                "PKCS12"
            } else if path.ends_with(".jceks") {
                "JCEKS"
            } else {
                "JKS"
            }
        }
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a certificate timestamp in any of the formats sources emit.
///
/// Accepted: RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC), `YYYY-MM-DD` (UTC
/// midnight), Unix seconds, keytool output (`Wed Mar 04 12:00:00 UTC 2026`)
/// and GSKit output (`March 4, 2026 12:00:00 PM GMT+00:00`).
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime> {
    let value = value.trim();
    let invalid = |reason: &str| Error::InvalidExpiry {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("empty"));
    }

    if let Ok(ts) = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339) {
        return Ok(ts.to_offset(UtcOffset::UTC));
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = value.parse().map_err(|_| invalid("epoch out of range"))?;
        return OffsetDateTime::from_unix_timestamp(secs).map_err(|_| invalid("epoch out of range"));
    }

    let local_formats: [&[time::format_description::BorrowedFormatItem<'_>]; 4] = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    ];
    for format in local_formats {
        if let Ok(ts) = PrimitiveDateTime::parse(value, format) {
            return Ok(ts.assume_utc());
        }
    }

    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }

    // Both layouts have six tokens: GSKit is `Month D, YYYY h:mm:ss AM|PM zone`,
    // keytool is `Dow Mon DD HH:MM:SS zone YYYY`.
    let tokens: Vec<&str> = value.split_whitespace().collect();
    match tokens.as_slice() {
        [month, day, year, clock, meridiem, zone]
            if day.ends_with(',') && is_meridiem(meridiem) =>
        {
            parse_gskit(month, day, year, clock, meridiem, zone)
                .ok_or_else(|| invalid("bad GSKit date"))
        }
        [weekday, month, day, clock, zone, year] if is_weekday(weekday) => {
            parse_keytool(month, day, clock, zone, year).ok_or_else(|| invalid("bad keytool date"))
        }
        _ => Err(invalid("unrecognized timestamp format")),
    }
}

fn is_meridiem(token: &str) -> bool {
    token.eq_ignore_ascii_case("AM") || token.eq_ignore_ascii_case("PM")
}

fn is_weekday(token: &str) -> bool {
    let Some(prefix) = token.get(..3) else {
        return false;
    };
    ["mon", "tue", "wed", "thu", "fri", "sat", "sun"]
        .iter()
        .any(|day| prefix.eq_ignore_ascii_case(day))
}

fn parse_keytool(
    month: &str,
    day: &str,
    clock: &str,
    zone: &str,
    year: &str,
) -> Option<OffsetDateTime> {
    let date = build_date(year, month, day)?;
    let time = Time::parse(clock, format_description!("[hour]:[minute]:[second]")).ok()?;
    let offset = zone_offset(zone)?;
    Some(
        PrimitiveDateTime::new(date, time)
            .assume_offset(offset)
            .to_offset(UtcOffset::UTC),
    )
}

fn parse_gskit(
    month: &str,
    day: &str,
    year: &str,
    clock: &str,
    meridiem: &str,
    zone: &str,
) -> Option<OffsetDateTime> {
    let date = build_date(year, month, day.trim_end_matches(','))?;
    let time = Time::parse(
        clock,
        format_description!("[hour padding:none]:[minute]:[second]"),
    )
    .ok()?;
    let hour = match (meridiem.to_ascii_uppercase().as_str(), time.hour()) {
        ("AM", 12) => 0,
        ("AM", h) if h < 12 => h,
        ("PM", 12) => 12,
        ("PM", h) if h < 12 => h + 12,
        _ => return None,
    };
    let time = Time::from_hms(hour, time.minute(), time.second()).ok()?;
    let offset = zone_offset(zone)?;
    Some(
        PrimitiveDateTime::new(date, time)
            .assume_offset(offset)
            .to_offset(UtcOffset::UTC),
    )
}

fn build_date(year: &str, month: &str, day: &str) -> Option<Date> {
    let year: i32 = year.parse().ok()?;
    let day: u8 = day.parse().ok()?;
    let month = month_from_name(month)?;
    Date::from_calendar_date(year, month, day).ok()
}

fn month_from_name(name: &str) -> Option<Month> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    Some(match prefix.as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    })
}

/// Resolve the zone designators keytool and GSKit print.
fn zone_offset(zone: &str) -> Option<UtcOffset> {
    let upper = zone.to_ascii_uppercase();
    let fixed = match upper.as_str() {
        "UTC" | "GMT" | "Z" => Some(0),
        "CET" | "WAT" | "BST" => Some(1),
        "CEST" | "EET" | "SAST" => Some(2),
        "EEST" | "TRT" | "MSK" => Some(3),
        "EDT" => Some(-4),
        "EST" | "CDT" => Some(-5),
        "CST" => Some(-6),
        "MST" => Some(-7),
        "PST" => Some(-8),
        "PDT" => Some(-7),
        _ => None,
    };
    if let Some(hours) = fixed {
        return UtcOffset::from_hms(hours, 0, 0).ok();
    }

    let numeric = upper
        .strip_prefix("GMT")
        .or_else(|| upper.strip_prefix("UTC"))
        .unwrap_or(&upper);
    parse_numeric_offset(numeric)
}

fn parse_numeric_offset(value: &str) -> Option<UtcOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1i8, &value[1..]),
        b'-' => (-1i8, &value[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i8 = digits[..2].parse().ok()?;
    let minutes: i8 = digits[2..].parse().ok()?;
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn now() -> OffsetDateTime {
        datetime!(2025-06-01 08:00 UTC)
    }

    fn raw_kdb(serial: &str) -> RawCertificate {
        RawCertificate {
            kind: CertificateKind::Kdb,
            serial_number: Some(serial.to_string()),
            subject: Some("CN=app1.example.com, O=Company".to_string()),
            server_hostname: Some("Server1.Example.com".to_string()),
            valid_to: Some("2025-12-31 23:59:59".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_serial_normalization() {
        assert_eq!(normalize_serial("00:ab:CD:01").as_deref(), Some("ABCD01"));
        assert_eq!(normalize_serial("0x00ff").as_deref(), Some("FF"));
        assert_eq!(normalize_serial(" 12 34 ").as_deref(), Some("1234"));
        assert_eq!(normalize_serial("0000").as_deref(), Some("0"));
        assert_eq!(normalize_serial(" : ").as_deref(), None);
    }

    #[test]
    fn test_natural_key_prefers_serial() {
        assert_eq!(
            natural_key(CertificateKind::Kdb, Some("ABC"), Some("h"), Some("a")).as_deref(),
            Some("kdb:ABC")
        );
        assert_eq!(
            natural_key(CertificateKind::Java, None, Some("Host.Example"), Some("Server")).as_deref(),
            Some("java:host.example:server")
        );
        assert!(natural_key(CertificateKind::Java, None, Some("host"), None).is_none());
    }

    #[test]
    fn test_same_certificate_from_two_sources_has_one_key() {
        let from_sql = normalize(raw_kdb("00:12:34:AB"), SyncSource::Sql, now()).unwrap();
        let from_api = normalize(raw_kdb("1234ab"), SyncSource::Api, now()).unwrap();
        assert_eq!(from_sql.cert_key, from_api.cert_key);
        assert_eq!(from_sql.cert_key, "kdb:1234AB");
    }

    #[test]
    fn test_normalize_derives_common_name_and_defaults() {
        let record = normalize(raw_kdb("1"), SyncSource::Sql, now()).unwrap();
        assert_eq!(record.common_name, "app1.example.com");
        assert_eq!(record.server_hostname.as_deref(), Some("server1.example.com"));
        assert_eq!(record.keystore_type.as_deref(), Some("KDB"));
        assert!(record.is_active);
        assert!(record.is_monitored);
        assert_eq!(record.valid_to, Some(datetime!(2025-12-31 23:59:59 UTC)));
        assert!(record.expiry_error.is_none());
    }

    #[test]
    fn test_normalize_java_keystore_type_from_path() {
        let raw = RawCertificate {
            kind: CertificateKind::Java,
            alias: Some("server_cert".to_string()),
            server_hostname: Some("java-app1".to_string()),
            keystore_path: Some("/opt/app/ssl/app.p12".to_string()),
            valid_to: Some("2026-01-01".to_string()),
            ..Default::default()
        };
        let record = normalize(raw, SyncSource::Ssh, now()).unwrap();
        assert_eq!(record.cert_key, "java:java-app1:server_cert");
        assert_eq!(record.common_name, "server_cert");
        assert_eq!(record.keystore_type.as_deref(), Some("PKCS12"));
    }

    #[test]
    fn test_unparseable_expiry_is_flagged_not_rejected() {
        let mut raw = raw_kdb("ABC");
        raw.valid_to = Some("next tuesday".to_string());
        let record = normalize(raw, SyncSource::Sql, now()).unwrap();
        assert!(record.is_invalid());
        assert!(record.expiry_error.as_deref().unwrap().contains("next tuesday"));
        assert_eq!(record.days_until_expiry(now()), None);
        assert!(!record.is_expired(now()));

        let mut missing = raw_kdb("ABD");
        missing.valid_to = None;
        let record = normalize(missing, SyncSource::Sql, now()).unwrap();
        assert!(record.is_invalid());
        assert_eq!(record.expiry_error.as_deref(), Some("expiry timestamp missing"));
    }

    #[test]
    fn test_record_without_identity_is_malformed() {
        let raw = RawCertificate {
            common_name: Some("orphan".to_string()),
            valid_to: Some("2026-01-01".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            normalize(raw, SyncSource::Api, now()),
            Err(Error::InvalidCertificate(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = datetime!(2026-03-04 12:00:00 UTC);
        assert_eq!(parse_timestamp("2026-03-04T12:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-03-04T15:00:00+03:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-03-04 12:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-03-04T12:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("Wed Mar 04 12:00:00 UTC 2026").unwrap(), expected);
        assert_eq!(parse_timestamp("Wed Mar 04 15:00:00 TRT 2026").unwrap(), expected);
        assert_eq!(
            parse_timestamp("March 4, 2026 12:00:00 PM GMT+00:00").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("March 4, 2026 3:00:00 PM GMT+03:00").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("2026-03-04").unwrap(),
            datetime!(2026-03-04 00:00:00 UTC)
        );
        assert_eq!(
            parse_timestamp("1772625600").unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_gskit_dates_across_meridiem() {
        assert_eq!(
            parse_timestamp("January 9, 2027 12:30:00 AM GMT+00:00").unwrap(),
            datetime!(2027-01-09 00:30:00 UTC)
        );
        assert_eq!(
            parse_timestamp("December 31, 2026 11:59:59 pm GMT-05:00").unwrap(),
            datetime!(2027-01-01 04:59:59 UTC)
        );
        let err = parse_timestamp("March 4, 2026 13:00:00 PM GMT+00:00").unwrap_err();
        assert!(err.to_string().contains("bad GSKit date"), "{err}");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("March 4 2026 12:00:00 PM GMT").is_err());
        assert!(parse_timestamp("Xyz Mar 04 12:00:00 UTC 2026").is_err());
        assert!(parse_timestamp("2026-13-45").is_err());
        assert!(parse_timestamp("Wed Foo 04 12:00:00 UTC 2026").is_err());
        assert!(parse_timestamp("Wed Mar 04 12:00:00 XYZ 2026").is_err());
    }

    #[test]
    fn test_common_name_from_subject() {
        assert_eq!(
            common_name_from_subject("O=Company, cn = api.example.com").as_deref(),
            Some("api.example.com")
        );
        assert_eq!(common_name_from_subject("O=Company"), None);
    }
}
