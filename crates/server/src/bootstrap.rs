//! Admin session initialization.

use crate::auth::random_token;
use anyhow::{Result, bail};
use portall_core::SessionScope;
use portall_core::config::AdminConfig;
use portall_metadata::MetadataStore;
use portall_metadata::models::SessionRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin session exists, rotating the previous one if needed.
///
/// The config carries only the hash of the admin secret. When the hash changes
/// between restarts, the previous bootstrap session is revoked and a new one
/// is created. The bootstrap session never expires.
pub async fn ensure_admin_session(
    metadata: &dyn MetadataStore,
    config: &AdminConfig,
) -> Result<()> {
    // Stored hashes are lowercase hex.
    let hash = config
        .session_hash
        .strip_prefix("sha256:")
        .unwrap_or(&config.session_hash)
        .to_lowercase();
    let hash = hash.as_str();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin session_hash: expected 64 hex chars");
    }

    if let Some(existing) = metadata.get_session_by_hash(hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin session hash matches a revoked session (id={}); \
                 configure a new admin secret",
                existing.session_id
            );
        }
        let now = OffsetDateTime::now_utc();
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin session hash matches an expired session (id={}, expired={}); \
                 configure a new admin secret",
                existing.session_id,
                expires_at
            );
        }
        metadata.set_bootstrap_session_id(existing.session_id).await?;
        tracing::debug!("Admin session already exists");
        return Ok(());
    }

    let scopes = config
        .scopes
        .clone()
        .unwrap_or_else(|| vec![SessionScope::PortalAdmin.as_str().to_string()]);
    for scope in &scopes {
        SessionScope::parse(scope).map_err(|_| anyhow::anyhow!("invalid admin scope: {scope}"))?;
    }

    let now = OffsetDateTime::now_utc();
    if let Some(prev_id) = metadata.get_bootstrap_session_id().await? {
        metadata.revoke_session(prev_id, now).await?;
        tracing::info!(session_id = %prev_id, "Previous admin session revoked");
    }

    let session = SessionRow {
        session_id: Uuid::new_v4(),
        session_hash: hash.to_string(),
        username: config.username.clone(),
        scopes: serde_json::to_string(&scopes)?,
        csrf_token: random_token(),
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_seen_at: None,
        description: Some("bootstrap admin".to_string()),
    };

    metadata.create_session(&session).await?;
    metadata
        .set_bootstrap_session_id(session.session_id)
        .await?;
    tracing::info!(session_id = %session.session_id, username = %session.username, "Admin session created");

    Ok(())
}
