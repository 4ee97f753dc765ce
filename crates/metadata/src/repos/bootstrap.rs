//! Bootstrap admin session marker repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for the bootstrap admin session marker.
#[async_trait]
pub trait BootstrapRepo: Send + Sync {
    /// Get the active bootstrap session ID, if set.
    async fn get_bootstrap_session_id(&self) -> MetadataResult<Option<Uuid>>;

    /// Set the active bootstrap session ID.
    async fn set_bootstrap_session_id(&self, session_id: Uuid) -> MetadataResult<()>;

    /// Clear the bootstrap session ID marker.
    async fn clear_bootstrap_session_id(&self) -> MetadataResult<()>;
}
