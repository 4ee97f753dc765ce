//! Integration tests for MetadataStore implementations.

mod common;

use common::fixtures::{duty, raw_cert, raw_cert_bad_expiry, sha256_hash};
use common::{TestMetadata, run_metadata_test_both};
use portall_core::{CertificateRecord, DutyEntry, SyncSource, normalize};
use portall_metadata::MetadataError;
use portall_metadata::models::*;
use portall_metadata::repos::{
    AnnouncementRepo, BootstrapRepo, CertificateRepo, ContentRepo, DutyRepo, JobRepo,
    NotificationRepo, SessionRepo,
};
use portall_server::jobs::recover_orphaned_jobs;
use time::macros::date;
use time::OffsetDateTime;
use uuid::Uuid;

fn record(serial: &str, host: &str, days: i64) -> CertificateRecord {
    normalize(
        raw_cert(serial, host, days),
        SyncSource::Sql,
        OffsetDateTime::now_utc(),
    )
    .unwrap()
}

fn job(job_type: &str, state: &str) -> JobRow {
    JobRow {
        job_id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        triggered_by: "manual".to_string(),
        state: state.to_string(),
        dry_run: false,
        started_at: Some(OffsetDateTime::now_utc()),
        finished_at: None,
        stats_json: None,
        error: None,
    }
}

fn claim(certificate_id: Uuid, tier: &str, cycle_key: &str) -> NotificationRow {
    NotificationRow {
        notification_id: Uuid::new_v4(),
        certificate_id,
        tier: tier.to_string(),
        cycle_key: cycle_key.to_string(),
        recipients: "ops@example.com".to_string(),
        subject: "expiring".to_string(),
        state: "pending".to_string(),
        error_message: None,
        created_at: OffsetDateTime::now_utc(),
        sent_at: None,
    }
}

fn announcement(title: &str, slug: &str) -> AnnouncementRow {
    let now = OffsetDateTime::now_utc();
    AnnouncementRow {
        announcement_id: Uuid::new_v4(),
        title: title.to_string(),
        slug: slug.to_string(),
        content: "body".to_string(),
        summary: None,
        kind: "general".to_string(),
        priority: "medium".to_string(),
        status: "draft".to_string(),
        pinned: false,
        related_system: None,
        category_id: None,
        owner: "alice".to_string(),
        work_date: None,
        published_at: None,
        expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn session(secret: &str) -> SessionRow {
    SessionRow {
        session_id: Uuid::new_v4(),
        session_hash: sha256_hash(secret.as_bytes()),
        username: "alice".to_string(),
        scopes: r#"["portal:read"]"#.to_string(),
        csrf_token: "csrf".to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_seen_at: None,
        description: None,
    }
}

#[tokio::test]
async fn test_certificate_upsert_outcomes() {
    run_metadata_test_both(|store| async move {
        let now = OffsetDateTime::now_utc();
        let first = record("0A1B", "web01.example.com", 30);

        let created = store.upsert_certificate(&first, now).await.unwrap();
        let UpsertOutcome::Created(id) = created else {
            panic!("expected Created, got {created:?}");
        };

        let again = store.upsert_certificate(&first, now).await.unwrap();
        assert_eq!(again, UpsertOutcome::Unchanged(id));

        // Same natural key, new expiry: the row is updated in place.
        let renewed = record("0A1B", "web01.example.com", 365);
        let updated = store.upsert_certificate(&renewed, now).await.unwrap();
        assert_eq!(updated, UpsertOutcome::Updated(id));

        let row = store.get_certificate(id).await.unwrap().unwrap();
        assert_eq!(row.valid_to, renewed.valid_to);
        // Serial keys drop leading zeros.
        assert_eq!(row.cert_key, "kdb:A1B");

        let by_key = store.get_certificate_by_key("kdb:A1B").await.unwrap();
        assert_eq!(by_key.map(|r| r.certificate_id), Some(id));
    })
    .await;
}

#[tokio::test]
async fn test_certificate_listing_and_stats() {
    run_metadata_test_both(|store| async move {
        let now = OffsetDateTime::now_utc();
        store
            .upsert_certificate(&record("01", "web01.example.com", 200), now)
            .await
            .unwrap();
        store
            .upsert_certificate(&record("02", "web02.example.com", 10), now)
            .await
            .unwrap();
        store
            .upsert_certificate(&record("03", "db01.example.com", -2), now)
            .await
            .unwrap();
        let bad = normalize(
            raw_cert_bad_expiry("04", "db02.example.com"),
            SyncSource::Api,
            now,
        )
        .unwrap();
        store.upsert_certificate(&bad, now).await.unwrap();

        let all = store
            .list_certificates(&CertificateFilter {
                active_only: true,
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        let order: Vec<_> = all.iter().map(|r| r.cert_key.as_str()).collect();
        // Soonest expiry first, invalid rows last.
        assert_eq!(order, vec!["kdb:3", "kdb:2", "kdb:1", "kdb:4"]);

        let web = store
            .list_certificates(&CertificateFilter {
                server: Some("web".to_string()),
                active_only: true,
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(web.len(), 2);

        let invalid = store
            .list_certificates(&CertificateFilter {
                invalid: Some(true),
                active_only: true,
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].source, "api");

        let stats = store.certificate_stats(now).await.unwrap();
        assert_eq!(stats.total.total, 4);
        assert_eq!(stats.total.expired, 1);
        assert_eq!(stats.total.expiring_30, 1);
        assert_eq!(stats.total.invalid, 1);
        assert_eq!(stats.by_kind["kdb"].total, 4);

        let alertable = store.list_alertable_certificates().await.unwrap();
        assert_eq!(alertable.len(), 4);
    })
    .await;
}

#[tokio::test]
async fn test_notification_claim_is_exclusive() {
    run_metadata_test_both(|store| async move {
        let now = OffsetDateTime::now_utc();
        let cert = store
            .upsert_certificate(&record("0A1B", "web01.example.com", 5), now)
            .await
            .unwrap()
            .certificate_id();

        let first = store
            .claim_notification(&claim(cert, "7_days", "2026-03-01"))
            .await
            .unwrap();
        let ClaimOutcome::Claimed(notification_id) = first else {
            panic!("first claim must succeed");
        };

        // Pending slots are not claimable.
        let second = store
            .claim_notification(&claim(cert, "7_days", "2026-03-01"))
            .await
            .unwrap();
        assert_eq!(second, ClaimOutcome::AlreadyClaimed);

        // A failed slot can be retried.
        store
            .mark_notification_failed(notification_id, "smtp down")
            .await
            .unwrap();
        let retry = store
            .claim_notification(&claim(cert, "7_days", "2026-03-01"))
            .await
            .unwrap();
        assert_eq!(retry, ClaimOutcome::Claimed(notification_id));

        store
            .mark_notification_sent(notification_id, now)
            .await
            .unwrap();
        let after_send = store
            .claim_notification(&claim(cert, "7_days", "2026-03-01"))
            .await
            .unwrap();
        assert_eq!(after_send, ClaimOutcome::AlreadyClaimed);

        // Other tiers and cycles are independent.
        let other_tier = store
            .claim_notification(&claim(cert, "1_day", "2026-03-01"))
            .await
            .unwrap();
        assert!(matches!(other_tier, ClaimOutcome::Claimed(_)));
        let next_day = store
            .claim_notification(&claim(cert, "7_days", "2026-03-02"))
            .await
            .unwrap();
        assert!(matches!(next_day, ClaimOutcome::Claimed(_)));

        let log = store
            .list_notifications_for_certificate(cert)
            .await
            .unwrap();
        assert_eq!(log.len(), 3);
        let sent = log
            .iter()
            .find(|n| n.notification_id == notification_id)
            .unwrap();
        assert_eq!(sent.state, "sent");
        assert!(sent.sent_at.is_some());
        assert!(sent.error_message.is_none());

        assert!(
            store
                .has_recent_notification(cert, "7_days", now - time::Duration::hours(24))
                .await
                .unwrap()
        );
        assert!(
            !store
                .has_recent_notification(cert, "30_days", now - time::Duration::hours(24))
                .await
                .unwrap()
        );
    })
    .await;
}

#[tokio::test]
async fn test_one_active_job_per_type() {
    run_metadata_test_both(|store| async move {
        let first = job("certificate_sync", "running");
        store.create_job(&first).await.unwrap();

        let err = store
            .create_job(&job("certificate_sync", "queued"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Constraint(_)), "got {err:?}");

        // Different types may run side by side.
        store
            .create_job(&job("certificate_alerts", "queued"))
            .await
            .unwrap();

        store
            .update_job_state(
                first.job_id,
                "finished",
                Some(OffsetDateTime::now_utc()),
                Some(r#"{"totals":{}}"#),
                None,
            )
            .await
            .unwrap();
        store
            .create_job(&job("certificate_sync", "queued"))
            .await
            .unwrap();

        let last = store
            .last_finished_job("certificate_sync")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.job_id, first.job_id);
        assert_eq!(last.stats_json.as_deref(), Some(r#"{"totals":{}}"#));

        let active = store.get_active_jobs("certificate_sync").await.unwrap();
        assert_eq!(active.len(), 1);

        let recent = store.list_recent_jobs(None, 10).await.unwrap();
        assert_eq!(recent.len(), 3);
    })
    .await;
}

#[tokio::test]
async fn test_orphaned_jobs_are_failed_on_recovery() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    let queued = job("weekly_report", "queued");
    let running = job("certificate_alerts", "running");
    let done = job("certificate_sync", "finished");
    for row in [&queued, &running, &done] {
        store.create_job(row).await.unwrap();
    }

    let recovered = recover_orphaned_jobs(store.as_ref()).await.unwrap();
    assert_eq!(recovered, 2);

    for id in [queued.job_id, running.job_id] {
        let row = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(row.state, "failed");
        assert_eq!(row.error.as_deref(), Some("interrupted by server restart"));
        assert!(row.finished_at.is_some());
    }
    assert!(store.get_orphaned_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transition_status_compare_and_set() {
    run_metadata_test_both(|store| async move {
        let row = announcement("Maintenance", "maintenance");
        let id = row.announcement_id;
        store.create_announcement(&row).await.unwrap();
        let now = OffsetDateTime::now_utc();

        let err = store
            .transition_status(ContentTable::Announcements, id, "published", "archived", now)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidStateTransition { .. }));

        store
            .transition_status(ContentTable::Announcements, id, "draft", "published", now)
            .await
            .unwrap();
        let published = store.get_announcement(id).await.unwrap().unwrap();
        assert_eq!(published.status, "published");
        let first_published = published.published_at.unwrap();

        // Losing a race against another writer surfaces as a bad transition.
        let err = store
            .transition_status(ContentTable::Announcements, id, "draft", "published", now)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidStateTransition { .. }));

        let later = now + time::Duration::minutes(5);
        store
            .transition_status(ContentTable::Announcements, id, "published", "draft", later)
            .await
            .unwrap();
        store
            .transition_status(ContentTable::Announcements, id, "draft", "published", later)
            .await
            .unwrap();
        let republished = store.get_announcement(id).await.unwrap().unwrap();
        assert_eq!(republished.published_at, Some(first_published));

        let err = store
            .transition_status(
                ContentTable::Announcements,
                Uuid::new_v4(),
                "draft",
                "published",
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    })
    .await;
}

#[tokio::test]
async fn test_announcement_slugs_and_expiry() {
    run_metadata_test_both(|store| async move {
        let now = OffsetDateTime::now_utc();
        let mut expired = announcement("Old", "old");
        expired.status = "published".to_string();
        expired.expires_at = Some(now - time::Duration::days(1));
        store.create_announcement(&expired).await.unwrap();

        let mut draft = announcement("Draft", "draft");
        draft.expires_at = Some(now - time::Duration::days(1));
        store.create_announcement(&draft).await.unwrap();

        assert!(store.slug_exists("old").await.unwrap());
        assert!(!store.slug_exists("new").await.unwrap());

        let dup = store.create_announcement(&announcement("Old", "old")).await;
        assert!(matches!(dup, Err(MetadataError::AlreadyExists(_))));

        // Only published rows past their expiry are archive candidates.
        let candidates = store.list_expired_announcements(now).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].announcement_id, expired.announcement_id);

        let counts = store.announcement_counts().await.unwrap();
        assert_eq!(counts.get("published"), Some(&1));
        assert_eq!(counts.get("draft"), Some(&1));
    })
    .await;
}

#[tokio::test]
async fn test_archived_announcements_reject_updates() {
    run_metadata_test_both(|store| async move {
        let mut row = announcement("Window", "window");
        row.status = "archived".to_string();
        store.create_announcement(&row).await.unwrap();

        row.title = "Edited".to_string();
        let err = store.update_announcement(&row).await.unwrap_err();
        assert!(matches!(err, MetadataError::Constraint(_)));
        let stored = store.get_announcement(row.announcement_id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Window");

        let mut draft = announcement("Draft", "draft-edit");
        store.create_announcement(&draft).await.unwrap();
        draft.title = "Draft v2".to_string();
        store.update_announcement(&draft).await.unwrap();

        let missing = announcement("Missing", "missing");
        let err = store.update_announcement(&missing).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    })
    .await;
}

#[tokio::test]
async fn test_category_links_and_inventory() {
    run_metadata_test_both(|store| async move {
        let now = OffsetDateTime::now_utc();
        let category = CategoryRow {
            category_id: Uuid::new_v4(),
            name: "Tools".to_string(),
            description: None,
            color: Some("#336699".to_string()),
            position: 1,
            status: "published".to_string(),
            owner: "alice".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_category(&category).await.unwrap();

        let link = LinkRow {
            link_id: Uuid::new_v4(),
            title: "Grafana".to_string(),
            url: "https://grafana.example.com".to_string(),
            description: None,
            category_id: Some(category.category_id),
            is_internal: true,
            requires_vpn: true,
            status: "draft".to_string(),
            owner: "alice".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_link(&link).await.unwrap();

        let drafts = store
            .list_links(Some("draft"), Some(category.category_id))
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(
            store
                .list_links(Some("published"), None)
                .await
                .unwrap()
                .is_empty()
        );

        store
            .transition_status(ContentTable::Links, link.link_id, "draft", "published", now)
            .await
            .unwrap();
        let stored = store.get_link(link.link_id).await.unwrap().unwrap();
        assert_eq!(stored.status, "published");

        let item = InventoryRow {
            item_id: Uuid::new_v4(),
            hostname: "web01.example.com".to_string(),
            item_type: "server".to_string(),
            environment: Some("prod".to_string()),
            description: None,
            status: "published".to_string(),
            owner: "alice".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_inventory_item(&item).await.unwrap();
        let servers = store
            .list_inventory(Some("published"), Some("server"))
            .await
            .unwrap();
        assert_eq!(servers.len(), 1);

        store.delete_inventory_item(item.item_id).await.unwrap();
        assert!(store.get_inventory_item(item.item_id).await.unwrap().is_none());
        let err = store.delete_inventory_item(item.item_id).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));

        store.delete_link(link.link_id).await.unwrap();
        store.delete_category(category.category_id).await.unwrap();
        assert!(store.list_categories(None).await.unwrap().is_empty());
    })
    .await;
}

#[tokio::test]
async fn test_duty_roster_upserts_by_date() {
    run_metadata_test_both(|store| async move {
        let now = OffsetDateTime::now_utc();
        let day = date!(2026 - 03 - 04);

        let first = duty(day, "Ayse Kaya");
        assert_eq!(
            store.upsert_duty(&first, "feed-a", now).await.unwrap(),
            DutyUpsert::Created
        );
        let later = now + time::Duration::hours(1);
        assert_eq!(
            store.upsert_duty(&first, "feed-b", later).await.unwrap(),
            DutyUpsert::Unchanged
        );
        let stored = store.get_duty(day).await.unwrap().unwrap();
        assert_eq!(stored.source, "feed-b");
        assert_eq!(stored.synced_at.unix_timestamp(), later.unix_timestamp());
        assert_eq!(stored.updated_at.unix_timestamp(), now.unix_timestamp());

        let changed = DutyEntry {
            email: Some("ali@example.com".to_string()),
            ..duty(day, "Ali Demir")
        };
        assert_eq!(
            store.upsert_duty(&changed, "feed-b", later).await.unwrap(),
            DutyUpsert::Updated
        );
        let stored = store.get_duty(day).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ali Demir");
        assert_eq!(stored.email.as_deref(), Some("ali@example.com"));
        assert_eq!(stored.duty_date, day);

        for (d, name) in [
            (date!(2026 - 03 - 01), "A"),
            (date!(2026 - 03 - 10), "B"),
            (date!(2026 - 04 - 20), "C"),
        ] {
            store.upsert_duty(&duty(d, name), "feed-b", now).await.unwrap();
        }

        let next = store.next_duty_after(day).await.unwrap().unwrap();
        assert_eq!(next.name, "B");
        assert!(store.next_duty_after(date!(2026 - 04 - 20)).await.unwrap().is_none());
        assert!(store.get_duty(date!(2026 - 03 - 05)).await.unwrap().is_none());

        let march: Vec<String> = store
            .list_duties(date!(2026 - 03 - 01), date!(2026 - 03 - 31))
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(march, vec!["A", "Ali Demir", "B"]);

        assert_eq!(store.delete_duties_before(date!(2026 - 03 - 10)).await.unwrap(), 2);
        let remaining = store
            .list_duties(date!(2026 - 01 - 01), date!(2026 - 12 - 31))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    })
    .await;
}

#[tokio::test]
async fn test_session_lifecycle() {
    run_metadata_test_both(|store| async move {
        let row = session("alice-secret");
        store.create_session(&row).await.unwrap();

        let found = store
            .get_session_by_hash(&row.session_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.session_id, row.session_id);
        assert_eq!(found.username, "alice");

        let seen = OffsetDateTime::now_utc();
        store.touch_session(row.session_id, seen).await.unwrap();
        store
            .revoke_session(row.session_id, seen)
            .await
            .unwrap();
        let revoked = store.get_session(row.session_id).await.unwrap().unwrap();
        assert!(revoked.revoked_at.is_some());
        assert!(revoked.last_seen_at.is_some());

        let err = store
            .revoke_session(Uuid::new_v4(), seen)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));

        assert!(store.get_bootstrap_session_id().await.unwrap().is_none());
        store
            .set_bootstrap_session_id(row.session_id)
            .await
            .unwrap();
        assert_eq!(
            store.get_bootstrap_session_id().await.unwrap(),
            Some(row.session_id)
        );
        store.clear_bootstrap_session_id().await.unwrap();
        assert!(store.get_bootstrap_session_id().await.unwrap().is_none());

        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
    })
    .await;
}
