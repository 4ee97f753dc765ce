use httpmock::Method::GET;
use httpmock::MockServer;
use portall_core::config::{ApiSourceConfig, SecretRef};
use portall_core::{CertificateKind, SyncSource};
use portall_sources::{ApiSource, CertificateSource, SourceError};
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn config(server: &MockServer, key: SecretRef, max_pages: u32) -> ApiSourceConfig {
    ApiSourceConfig {
        base_url: format!("{}/api", server.base_url()),
        path: "/certificates".to_string(),
        api_key: key,
        api_key_header: "X-API-Key".to_string(),
        timeout_secs: 5,
        max_pages,
    }
}

#[tokio::test]
async fn fetch_sends_key_and_decodes_array() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/certificates")
                .header("X-API-Key", "k-123");
            then.status(200).json_body(json!([
                {
                    "serial": "0A1B",
                    "cn": "app.example.com",
                    "kind": "java",
                    "hostname": "app01",
                    "not_after": "2026-03-01T00:00:00Z",
                    "appviewx_id": "avx-1"
                },
                {
                    "serial_number": "0C",
                    "label": "mq cert",
                    "valid_to": "2026-04-01"
                }
            ]));
        })
        .await;

    let source = ApiSource::new(config(&server, SecretRef::inline("k-123"), 5)).unwrap();
    assert_eq!(source.source(), SyncSource::Api);

    let batch = source.fetch().await.unwrap();
    mock.assert_async().await;

    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.malformed, 0);
    let first = &batch.rows[0];
    assert_eq!(first.kind, CertificateKind::Java);
    assert_eq!(first.serial_number.as_deref(), Some("0A1B"));
    assert_eq!(first.server_hostname.as_deref(), Some("app01"));
    assert_eq!(first.valid_to.as_deref(), Some("2026-03-01T00:00:00Z"));
    assert_eq!(first.external_id.as_deref(), Some("avx-1"));
    assert_eq!(batch.rows[1].kind, CertificateKind::Kdb);
    assert_eq!(batch.rows[1].alias.as_deref(), Some("mq cert"));
}

#[tokio::test]
async fn fetch_maps_payloads_with_both_canonical_and_vendor_names() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/certificates");
            then.status(200).json_body(json!([
                {
                    "id": 17,
                    "appviewx_id": "avx-17",
                    "hostname": "legacy01",
                    "server_hostname": "app01",
                    "serial": "0A",
                    "serial_number": "0A1B",
                    "expiry": "2026-05-01",
                    "valid_to": "2026-06-01T00:00:00Z"
                },
                { "id": 42, "serial": "0C" }
            ]));
        })
        .await;

    let source = ApiSource::new(config(&server, SecretRef::inline("k"), 5)).unwrap();
    let batch = source.fetch().await.unwrap();

    assert_eq!(batch.malformed, 0);
    assert_eq!(batch.rows.len(), 2);
    let first = &batch.rows[0];
    assert_eq!(first.external_id.as_deref(), Some("avx-17"));
    assert_eq!(first.server_hostname.as_deref(), Some("app01"));
    assert_eq!(first.serial_number.as_deref(), Some("0A1B"));
    assert_eq!(first.valid_to.as_deref(), Some("2026-06-01T00:00:00Z"));
    assert_eq!(batch.rows[1].external_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn fetch_follows_next_links_and_counts_malformed_items() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/certificates");
            then.status(200).json_body(json!({
                "certificates": [{ "serial": "01", "cn": "a.example.com" }],
                "next": "/api/certificates/page/2"
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/certificates/page/2");
            then.status(200).json_body(json!({
                "certificates": [
                    { "serial": "02", "cn": "b.example.com" },
                    { "serial": 17, "is_active": "maybe" }
                ],
                "next": null
            }));
        })
        .await;

    let source = ApiSource::new(config(&server, SecretRef::inline("k"), 5)).unwrap();
    let batch = source.fetch().await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.malformed, 1);
    assert!(batch.warnings.is_empty());
}

#[tokio::test]
async fn fetch_stops_at_page_limit_with_warning() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/certificates");
            then.status(200).json_body(json!({
                "certificates": [{ "serial": "01" }],
                "next": "/api/certificates"
            }));
        })
        .await;

    let source = ApiSource::new(config(&server, SecretRef::inline("k"), 2)).unwrap();
    let batch = source.fetch().await.unwrap();

    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.warnings.len(), 1);
}

#[tokio::test]
async fn rejected_key_is_an_auth_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/certificates");
            then.status(401).body("invalid key");
        })
        .await;

    let source = ApiSource::new(config(&server, SecretRef::inline("bad"), 5)).unwrap();
    assert!(matches!(source.fetch().await, Err(SourceError::Auth(_))));
}

#[tokio::test]
async fn server_error_is_unreachable() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/certificates");
            then.status(503).body("maintenance");
        })
        .await;

    let source = ApiSource::new(config(&server, SecretRef::inline("k"), 5)).unwrap();
    match source.fetch().await {
        Err(SourceError::Unreachable(message)) => assert!(message.contains("maintenance")),
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_key_never_calls_the_api() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/certificates");
            then.status(200).json_body(json!([]));
        })
        .await;

    let source = ApiSource::new(config(
        &server,
        SecretRef::env("PORTALL_TEST_UNSET_API_KEY"),
        5,
    ))
    .unwrap();
    assert!(matches!(
        source.fetch().await,
        Err(SourceError::MissingCredential(_))
    ));
    mock.assert_hits_async(0).await;
}
