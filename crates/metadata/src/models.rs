//! Database models mapping to the metadata schema.

use portall_core::{CertificateRecord, DutyEntry};
use sqlx::FromRow;
use std::collections::BTreeMap;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

// =============================================================================
// Certificates
// =============================================================================

/// Certificate record, one row per natural key.
#[derive(Debug, Clone, FromRow)]
pub struct CertificateRow {
    pub certificate_id: Uuid,
    pub cert_key: String,
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
    pub fingerprint_sha256: Option<String>,
    pub valid_from: Option<OffsetDateTime>,
    pub valid_to: Option<OffsetDateTime>,
    pub expiry_error: Option<String>,
    pub source: String,
    pub external_id: Option<String>,
    pub is_active: bool,
    pub is_monitored: bool,
    pub last_synced_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl CertificateRow {
    /// Build a fresh row from a normalized record.
    pub fn from_record(record: &CertificateRecord, now: OffsetDateTime) -> Self {
        Self {
            certificate_id: Uuid::new_v4(),
            cert_key: record.cert_key.clone(),
            kind: record.kind.as_str().to_string(),
            common_name: record.common_name.clone(),
            serial_number: record.serial_number.clone(),
            alias: record.alias.clone(),
            subject: record.subject.clone(),
            issuer: record.issuer.clone(),
            server_hostname: record.server_hostname.clone(),
            application_name: record.application_name.clone(),
            environment: record.environment.clone(),
            keystore_path: record.keystore_path.clone(),
            keystore_type: record.keystore_type.clone(),
            signature_algorithm: record.signature_algorithm.clone(),
            fingerprint_sha256: record.fingerprint_sha256.clone(),
            valid_from: record.valid_from,
            valid_to: record.valid_to,
            expiry_error: record.expiry_error.clone(),
            source: record.source.as_str().to_string(),
            external_id: record.external_id.clone(),
            is_active: record.is_active,
            is_monitored: record.is_monitored,
            last_synced_at: record.last_synced_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `record` carries the same descriptive fields as this row.
    ///
    /// Sync bookkeeping (`source`, `last_synced_at`) is ignored.
    pub fn matches_record(&self, record: &CertificateRecord) -> bool {
        self.kind == record.kind.as_str()
            && self.common_name == record.common_name
            && self.serial_number == record.serial_number
            && self.alias == record.alias
            && self.subject == record.subject
            && self.issuer == record.issuer
            && self.server_hostname == record.server_hostname
            && self.application_name == record.application_name
            && self.environment == record.environment
            && self.keystore_path == record.keystore_path
            && self.keystore_type == record.keystore_type
            && self.signature_algorithm == record.signature_algorithm
            && self.fingerprint_sha256 == record.fingerprint_sha256
            && self.valid_from == record.valid_from
            && self.valid_to == record.valid_to
            && self.expiry_error == record.expiry_error
            && self.external_id == record.external_id
            && self.is_active == record.is_active
            && self.is_monitored == record.is_monitored
    }
}

/// Result of an upsert by natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Uuid),
    Updated(Uuid),
    /// Row already held identical data; only `last_synced_at` moved.
    Unchanged(Uuid),
}

impl UpsertOutcome {
    pub fn certificate_id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Unchanged(id) => *id,
        }
    }
}

/// Filters for certificate listings.
#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub kind: Option<String>,
    pub environment: Option<String>,
    /// Substring match on hostname.
    pub server: Option<String>,
    /// Only certificates expiring before this instant (expired included).
    pub expiring_before: Option<OffsetDateTime>,
    /// `Some(true)`: only invalid rows; `Some(false)`: only rows with an expiry.
    pub invalid: Option<bool>,
    pub active_only: bool,
    pub limit: u32,
    pub offset: u32,
}

/// Per-kind certificate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KindStats {
    pub total: u64,
    pub expired: u64,
    pub expiring_30: u64,
    pub invalid: u64,
}

impl KindStats {
    /// Certificates neither expired, expiring soon, nor invalid.
    pub fn valid(&self) -> u64 {
        self.total
            .saturating_sub(self.expired)
            .saturating_sub(self.expiring_30)
            .saturating_sub(self.invalid)
    }
}

/// Active certificate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CertificateStats {
    pub total: KindStats,
    pub by_kind: BTreeMap<String, KindStats>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Alert notification claim and delivery log.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub notification_id: Uuid,
    pub certificate_id: Uuid,
    pub tier: String,
    pub cycle_key: String,
    pub recipients: String,
    pub subject: String,
    pub state: String,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub sent_at: Option<OffsetDateTime>,
}

/// Result of claiming a (certificate, tier, cycle) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This run owns the notification and must send it.
    Claimed(Uuid),
    /// Another run already sent or is sending it.
    AlreadyClaimed,
}

// =============================================================================
// Jobs
// =============================================================================

/// Background job run.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: Uuid,
    pub job_type: String,
    pub triggered_by: String,
    pub state: String,
    pub dry_run: bool,
    pub started_at: Option<OffsetDateTime>,
    pub finished_at: Option<OffsetDateTime>,
    pub stats_json: Option<String>,
    pub error: Option<String>,
}

// =============================================================================
// Content
// =============================================================================

/// Announcement.
#[derive(Debug, Clone, FromRow)]
pub struct AnnouncementRow {
    pub announcement_id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub summary: Option<String>,
    pub kind: String,
    pub priority: String,
    pub status: String,
    pub pinned: bool,
    pub related_system: Option<String>,
    pub category_id: Option<Uuid>,
    pub owner: String,
    pub work_date: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Filters for announcement listings.
#[derive(Debug, Clone, Default)]
pub struct AnnouncementFilter {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub category_id: Option<Uuid>,
    pub pinned: Option<bool>,
    pub limit: u32,
    pub offset: u32,
}

/// Category.
#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub position: i32,
    pub status: String,
    pub owner: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Link directory entry.
#[derive(Debug, Clone, FromRow)]
pub struct LinkRow {
    pub link_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub is_internal: bool,
    pub requires_vpn: bool,
    pub status: String,
    pub owner: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Inventory item (server or application).
#[derive(Debug, Clone, FromRow)]
pub struct InventoryRow {
    pub item_id: Uuid,
    pub hostname: String,
    pub item_type: String,
    pub environment: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub owner: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Content tables that share the draft/published/archived lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTable {
    Announcements,
    Categories,
    Links,
    Inventory,
}

impl ContentTable {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Announcements => "announcements",
            Self::Categories => "categories",
            Self::Links => "links",
            Self::Inventory => "inventory_items",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            Self::Announcements => "announcement_id",
            Self::Categories => "category_id",
            Self::Links => "link_id",
            Self::Inventory => "item_id",
        }
    }

    /// Singular noun for error messages.
    pub fn entity(&self) -> &'static str {
        match self {
            Self::Announcements => "announcement",
            Self::Categories => "category",
            Self::Links => "link",
            Self::Inventory => "inventory item",
        }
    }
}

// =============================================================================
// On-call roster
// =============================================================================

/// One day of the on-call roster, keyed by date.
#[derive(Debug, Clone, FromRow)]
pub struct DutyRow {
    pub duty_date: Date,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    /// Where the entry came from (the feed URL).
    pub source: String,
    pub synced_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl DutyRow {
    /// Whether `entry` carries the same person and contact details.
    pub fn matches_entry(&self, entry: &DutyEntry) -> bool {
        self.name == entry.name
            && self.phone == entry.phone
            && self.email == entry.email
            && self.notes == entry.notes
    }
}

/// Result of a roster upsert by date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyUpsert {
    Created,
    Updated,
    /// Same details; only `synced_at` moved.
    Unchanged,
}

// =============================================================================
// Sessions
// =============================================================================

/// Authenticated session record.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub session_hash: String,
    pub username: String,
    pub scopes: String, // JSON array
    pub csrf_token: String,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_seen_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}
