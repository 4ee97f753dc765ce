#[path = "../src/api_client.rs"]
#[allow(dead_code)] // Some methods are used by the binary but not by tests
mod api_client;

use api_client::{ApiClient, CertificateQuery, CreateSessionRequest, TriggerJobRequest};
use httpmock::Method::{DELETE, GET, POST};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

const SECRET: &str = "secret-token";
const JOB_ID: &str = "00000000-0000-0000-0000-000000000003";
const CERT_ID: &str = "00000000-0000-0000-0000-000000000004";

fn certificate_json() -> serde_json::Value {
    json!({
        "certificate_id": CERT_ID,
        "kind": "kdb",
        "common_name": "web01.example.com",
        "serial_number": "0A1B",
        "alias": null,
        "server_hostname": "web01.example.com",
        "environment": "prod",
        "keystore_path": "/opt/ihs/key.kdb",
        "valid_to": "2026-05-01T00:00:00Z",
        "days_until_expiry": 12,
        "expiry_error": null,
        "source": "sql",
        "is_active": true,
        "is_monitored": true,
        "last_synced_at": "2026-04-19T00:00:00Z"
    })
}

#[tokio::test]
async fn api_client_job_endpoints() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    let trigger = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/admin/jobs")
            .header("authorization", format!("Bearer {SECRET}"))
            .json_body(json!({"job_type": "certificate_sync", "dry_run": true, "server": "web"}));
        then.status(202).json_body(json!({
            "job_id": JOB_ID,
            "job_type": "certificate_sync",
            "dry_run": true
        }));
    });

    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/admin/jobs")
            .query_param("job_type", "certificate_sync")
            .query_param("limit", "5");
        then.status(200).json_body(json!([]));
    });

    let get = server.mock(|when, then| {
        when.method(GET).path(format!("/v1/admin/jobs/{JOB_ID}"));
        then.status(200).json_body(json!({
            "job_id": JOB_ID,
            "job_type": "certificate_sync",
            "triggered_by": "manual",
            "state": "finished",
            "dry_run": true,
            "started_at": "2026-04-19T00:00:00Z",
            "finished_at": "2026-04-19T00:00:02Z",
            "stats": {"totals": {"created": 2}},
            "error": null
        }));
    });

    let client = ApiClient::new(&server.base_url(), SECRET).unwrap();

    let response = client
        .trigger_job(TriggerJobRequest {
            job_type: "certificate_sync".to_string(),
            dry_run: true,
            server: Some("web".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.job_id, JOB_ID);
    assert!(response.dry_run);

    let jobs = client
        .list_jobs(Some("certificate_sync"), Some(5))
        .await
        .unwrap();
    assert!(jobs.is_empty());

    let job = client.get_job(JOB_ID).await.unwrap();
    assert!(job.is_done());
    assert_eq!(job.stats.unwrap()["totals"]["created"], 2);

    trigger.assert();
    list.assert();
    get.assert();
}

#[tokio::test]
async fn api_client_certificate_endpoints() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/certificates")
            .query_param("kind", "kdb")
            .query_param("expiring_within_days", "30")
            .query_param("invalid", "true");
        then.status(200).json_body(json!([certificate_json()]));
    });

    server.mock(|when, then| {
        when.method(GET).path("/v1/certificates/stats");
        then.status(200).json_body(json!({
            "total": {"total": 3, "expired": 1, "expiring_30": 1, "invalid": 1},
            "by_kind": {"kdb": {"total": 3, "expired": 1, "expiring_30": 1, "invalid": 1}}
        }));
    });

    server.mock(|when, then| {
        when.method(GET).path(format!("/v1/certificates/{CERT_ID}"));
        then.status(200).json_body(certificate_json());
    });

    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/v1/certificates/{CERT_ID}/notifications"));
        then.status(200).json_body(json!([{
            "notification_id": "00000000-0000-0000-0000-000000000005",
            "tier": "30_days",
            "cycle_key": "2026-04-19",
            "recipients": ["ops@example.com"],
            "subject": "expiring",
            "state": "sent",
            "error_message": null,
            "created_at": "2026-04-19T00:00:00Z",
            "sent_at": "2026-04-19T00:00:01Z"
        }]));
    });

    let client = ApiClient::new(&server.base_url(), SECRET).unwrap();

    let certs = client
        .list_certificates(&CertificateQuery {
            kind: Some("kdb".to_string()),
            expiring_within_days: Some(30),
            invalid: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(certs.len(), 1);
    assert_eq!(certs[0].days_until_expiry, Some(12));
    list.assert();

    let stats = client.certificate_stats().await.unwrap();
    assert_eq!(stats.total.total, 3);
    assert_eq!(stats.by_kind["kdb"].invalid, 1);

    let cert = client.get_certificate(CERT_ID).await.unwrap();
    assert_eq!(cert.common_name, "web01.example.com");

    let notifications = client.certificate_notifications(CERT_ID).await.unwrap();
    assert_eq!(notifications[0].recipients, vec!["ops@example.com"]);
}

#[tokio::test]
async fn api_client_announcement_and_session_endpoints() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let announcement_id = "00000000-0000-0000-0000-000000000006";
    let session_id = "00000000-0000-0000-0000-000000000007";

    let status = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/v1/announcements/{announcement_id}/status"))
            .json_body(json!({"status": "published"}));
        then.status(200).json_body(json!({
            "announcement_id": announcement_id,
            "title": "Maintenance",
            "slug": "maintenance",
            "content": "Tonight",
            "summary": null,
            "kind": "maintenance",
            "priority": "high",
            "status": "published",
            "pinned": false,
            "published_at": "2026-04-19T00:00:00Z",
            "expires_at": null,
            "created_at": "2026-04-18T00:00:00Z",
            "updated_at": "2026-04-19T00:00:00Z"
        }));
    });

    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/admin/sessions")
            .json_body(json!({
                "username": "ops",
                "scopes": ["portal:read"],
                "expires_in_secs": 3600,
                "description": null
            }));
        then.status(201).json_body(json!({
            "session_id": session_id,
            "session_secret": "new-secret",
            "csrf_token": "csrf",
            "expires_at": "2026-04-19T01:00:00Z"
        }));
    });

    let revoke = server.mock(|when, then| {
        when.method(DELETE)
            .path(format!("/v1/admin/sessions/{session_id}"));
        then.status(204);
    });

    let client = ApiClient::new(&server.base_url(), SECRET).unwrap();

    let updated = client
        .change_announcement_status(announcement_id, "published")
        .await
        .unwrap();
    assert_eq!(updated.status, "published");
    assert!(updated.published_at.is_some());

    let session = client
        .create_session(CreateSessionRequest {
            username: "ops".to_string(),
            scopes: vec!["portal:read".to_string()],
            expires_in_secs: Some(3600),
            description: None,
        })
        .await
        .unwrap();
    assert_eq!(session.session_secret, "new-secret");

    client.revoke_session(session_id).await.unwrap();

    status.assert();
    create.assert();
    revoke.assert();
}

#[tokio::test]
async fn api_client_returns_error_body_on_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/admin/jobs")
            .header("authorization", format!("Bearer {SECRET}"));
        then.status(409)
            .body(r#"{"code":"conflict","message":"another certificate_sync job is already active"}"#);
    });

    let client = ApiClient::new(&server.base_url(), SECRET).unwrap();
    let err = client
        .trigger_job(TriggerJobRequest {
            job_type: "certificate_sync".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("API error (409"));
    assert!(err.to_string().contains("already active"));
}

#[tokio::test]
async fn api_client_duty_endpoints() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    let current = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/duty/current")
            .header("authorization", format!("Bearer {SECRET}"));
        then.status(200).json_body(json!({
            "date": "2026-03-04",
            "current": {
                "date": "2026-03-04",
                "name": "Ayse Kaya",
                "phone": "100",
                "email": null,
                "notes": null,
                "days_until": 0,
                "source": "https://roster.example.com/duty.csv",
                "synced_at": "2026-03-04T06:00:00Z"
            },
            "next": null
        }));
    });
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/duty")
            .query_param("from", "2026-03-01")
            .query_param("to", "2026-03-31");
        then.status(200).json_body(json!([]));
    });

    let client = ApiClient::new(&server.base_url(), SECRET).unwrap();
    let duty = client.current_duty().await.unwrap();
    assert_eq!(duty.current.unwrap().name, "Ayse Kaya");
    assert!(duty.next.is_none());
    current.assert();

    let duties = client
        .list_duties(Some("2026-03-01"), Some("2026-03-31"))
        .await
        .unwrap();
    assert!(duties.is_empty());
    list.assert();
}
