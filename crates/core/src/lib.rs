//! Core domain types and shared logic for Portall.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Certificate records and the normalizer that builds them from raw source rows
//! - Expiry alert tiers and the tier evaluator
//! - Content lifecycle (announcements, categories, links, inventory)
//! - The daily on-call roster
//! - Session scopes and authorization
//! - Job schedules

pub mod alert;
pub mod certificate;
pub mod config;
pub mod content;
pub mod duty;
pub mod error;
pub mod schedule;
pub mod session;

pub use alert::{AlertThresholds, AlertTier, DedupWindow, Evaluation, days_until};
pub use certificate::{
    CertificateKind, CertificateRecord, RawCertificate, SyncSource, normalize, parse_timestamp,
};
pub use content::{AnnouncementKind, ContentStatus, InventoryType, Priority, slugify};
pub use duty::{DutyEntry, DutyFormat, days_until_duty, parse_duty_date};
pub use error::{Error, Result};
pub use schedule::Schedule;
pub use session::{Session, SessionId, SessionScope};

/// Header carrying the CSRF token on state-changing browser requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Name of the session cookie issued to browser clients.
pub const SESSION_COOKIE: &str = "portall_session";
