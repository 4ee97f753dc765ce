//! PostgreSQL-specific metadata tests.
//!
//! These need Docker for testcontainers. Set `SKIP_POSTGRES_TESTS=1` to skip
//! them explicitly.

mod common;

use common::fixtures::raw_cert;
use common::postgres_or_skip;
use portall_core::{SyncSource, normalize};
use portall_metadata::MetadataError;
use portall_metadata::models::{ClaimOutcome, JobRow, NotificationRow};
use portall_metadata::repos::{CertificateRepo, JobRepo, NotificationRepo};
use time::OffsetDateTime;
use uuid::Uuid;

#[tokio::test]
async fn test_postgres_concurrent_claims_send_once() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store();
    let now = OffsetDateTime::now_utc();

    let record = normalize(
        raw_cert("0A1B", "web01.example.com", 5),
        SyncSource::Sql,
        now,
    )
    .unwrap();
    let cert = store
        .upsert_certificate(&record, now)
        .await
        .unwrap()
        .certificate_id();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .claim_notification(&NotificationRow {
                    notification_id: Uuid::new_v4(),
                    certificate_id: cert,
                    tier: "7_days".to_string(),
                    cycle_key: "2026-03-01".to_string(),
                    recipients: "ops@example.com".to_string(),
                    subject: "expiring".to_string(),
                    state: "pending".to_string(),
                    error_message: None,
                    created_at: OffsetDateTime::now_utc(),
                    sent_at: None,
                })
                .await
                .unwrap()
        }));
    }

    let mut claimed = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), ClaimOutcome::Claimed(_)) {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);
}

#[tokio::test]
async fn test_postgres_concurrent_job_creation() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_job(&JobRow {
                    job_id: Uuid::new_v4(),
                    job_type: "certificate_sync".to_string(),
                    triggered_by: "schedule".to_string(),
                    state: "queued".to_string(),
                    dry_run: false,
                    started_at: Some(OffsetDateTime::now_utc()),
                    finished_at: None,
                    stats_json: None,
                    error: None,
                })
                .await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => created += 1,
            Err(MetadataError::Constraint(_)) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn test_postgres_timestamps_round_trip_in_utc() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store();
    let now = OffsetDateTime::now_utc();

    let record = normalize(
        raw_cert("0C2D", "web02.example.com", 45),
        SyncSource::Api,
        now,
    )
    .unwrap();
    let id = store
        .upsert_certificate(&record, now)
        .await
        .unwrap()
        .certificate_id();

    let row = store.get_certificate(id).await.unwrap().unwrap();
    assert_eq!(row.valid_to, record.valid_to);
    assert_eq!(row.source, "api");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM certificates")
        .fetch_one(metadata.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}
