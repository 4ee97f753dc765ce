//! HTTP API server for the operations portal.
//!
//! This crate provides:
//! - Announcement, category, link and inventory endpoints
//! - Read-only certificate endpoints
//! - Background jobs (certificate sync, expiry alerts, announcement
//!   archive, weekly report) with manual and scheduled triggers
//! - Session management

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
