//! Admin session bootstrap tests.

mod common;

use axum::http::StatusCode;
use common::fixtures::sha256_hash;
use common::{TestMetadata, TestServer};
use portall_core::config::AdminConfig;
use portall_metadata::models::SessionRow;
use portall_metadata::repos::{BootstrapRepo, SessionRepo};
use portall_server::bootstrap::ensure_admin_session;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn admin_config(secret: &str) -> AdminConfig {
    AdminConfig {
        session_hash: format!("sha256:{}", sha256_hash(secret.as_bytes())),
        username: "root".to_string(),
        scopes: None,
    }
}

fn existing_session(secret: &str) -> SessionRow {
    SessionRow {
        session_id: Uuid::new_v4(),
        session_hash: sha256_hash(secret.as_bytes()),
        username: "root".to_string(),
        scopes: r#"["portal:admin"]"#.to_string(),
        csrf_token: "csrf".to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_seen_at: None,
        description: None,
    }
}

#[tokio::test]
async fn test_bootstrap_creates_session_once() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    let config = admin_config("first-secret");

    ensure_admin_session(store.as_ref(), &config).await.unwrap();
    let session_id = store
        .get_bootstrap_session_id()
        .await
        .unwrap()
        .expect("bootstrap session recorded");

    let session = store.get_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.username, "root");
    assert_eq!(session.scopes, r#"["portal:admin"]"#);
    assert!(session.expires_at.is_none());
    assert!(session.revoked_at.is_none());

    // Restart with the same secret reuses the session.
    ensure_admin_session(store.as_ref(), &config).await.unwrap();
    assert_eq!(
        store.get_bootstrap_session_id().await.unwrap(),
        Some(session_id)
    );
    assert_eq!(store.list_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bootstrap_rotates_when_hash_changes() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    ensure_admin_session(store.as_ref(), &admin_config("old-secret"))
        .await
        .unwrap();
    let old_id = store.get_bootstrap_session_id().await.unwrap().unwrap();

    ensure_admin_session(store.as_ref(), &admin_config("new-secret"))
        .await
        .unwrap();
    let new_id = store.get_bootstrap_session_id().await.unwrap().unwrap();
    assert_ne!(old_id, new_id);

    let old = store.get_session(old_id).await.unwrap().unwrap();
    assert!(old.revoked_at.is_some());
    let new = store.get_session(new_id).await.unwrap().unwrap();
    assert!(new.revoked_at.is_none());

    // Going back to the revoked secret is refused.
    let err = ensure_admin_session(store.as_ref(), &admin_config("old-secret"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("revoked"), "{err}");
}

#[tokio::test]
async fn test_bootstrap_rejects_expired_session() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    let mut expired = existing_session("stale-secret");
    expired.expires_at = Some(OffsetDateTime::now_utc() - Duration::hours(1));
    store.create_session(&expired).await.unwrap();

    let err = ensure_admin_session(store.as_ref(), &admin_config("stale-secret"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expired"), "{err}");
}

#[tokio::test]
async fn test_bootstrap_adopts_matching_session() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    let existing = existing_session("shared-secret");
    store.create_session(&existing).await.unwrap();

    ensure_admin_session(store.as_ref(), &admin_config("shared-secret"))
        .await
        .unwrap();
    assert_eq!(
        store.get_bootstrap_session_id().await.unwrap(),
        Some(existing.session_id)
    );
}

#[tokio::test]
async fn test_bootstrap_rejects_malformed_hash() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    for hash in ["", "sha256:abc", &"z".repeat(64)] {
        let config = AdminConfig {
            session_hash: hash.to_string(),
            username: "root".to_string(),
            scopes: None,
        };
        let err = ensure_admin_session(store.as_ref(), &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("session_hash"), "{err}");
    }
    assert!(store.get_bootstrap_session_id().await.unwrap().is_none());
}

#[tokio::test]
async fn test_bootstrap_with_custom_scopes() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    let mut config = admin_config("scoped-secret");
    config.scopes = Some(vec!["portal:read".to_string(), "content:write".to_string()]);
    ensure_admin_session(store.as_ref(), &config).await.unwrap();

    let id = store.get_bootstrap_session_id().await.unwrap().unwrap();
    let session = store.get_session(id).await.unwrap().unwrap();
    assert_eq!(session.scopes, r#"["portal:read","content:write"]"#);

    config.scopes = Some(vec!["cache:admin".to_string()]);
    config.session_hash = sha256_hash(b"another-secret");
    let err = ensure_admin_session(store.as_ref(), &config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid admin scope"), "{err}");
}

#[tokio::test]
async fn test_bootstrap_session_authenticates_over_api() {
    let server = TestServer::new().await;

    let (status, body) = server.admin("GET", "/v1/auth/whoami", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");

    let (status, _) = server
        .request("GET", "/v1/auth/whoami", None, Some("wrong-secret"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
