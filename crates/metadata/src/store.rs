//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult, is_unique_violation, map_duplicate};
use crate::models::{CertificateStats, KindStats};
use crate::repos::{
    AnnouncementRepo, BootstrapRepo, CertificateRepo, ContentRepo, DutyRepo, JobRepo,
    NotificationRepo, SessionRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    CertificateRepo
    + NotificationRepo
    + JobRepo
    + AnnouncementRepo
    + ContentRepo
    + DutyRepo
    + SessionRepo
    + BootstrapRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the file and schema if missing.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // A single connection serializes writers; the job model never needs
        // more than one concurrent writer.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(path = %path.display(), "SQLite metadata store ready");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Fold `(kind, total, expired, expiring_30, invalid)` rows into stats.
pub(crate) fn stats_from_rows(rows: Vec<(String, i64, i64, i64, i64)>) -> CertificateStats {
    let mut by_kind = BTreeMap::new();
    let mut total = KindStats::default();
    for (kind, count, expired, expiring_30, invalid) in rows {
        let stats = KindStats {
            total: count.max(0) as u64,
            expired: expired.max(0) as u64,
            expiring_30: expiring_30.max(0) as u64,
            invalid: invalid.max(0) as u64,
        };
        total.total += stats.total;
        total.expired += stats.expired;
        total.expiring_30 += stats.expiring_30;
        total.invalid += stats.invalid;
        by_kind.insert(kind, stats);
    }
    CertificateStats { total, by_kind }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use portall_core::{CertificateRecord, DutyEntry};
    use sqlx::QueryBuilder;
    use time::{Date, OffsetDateTime};
    use uuid::Uuid;

    #[async_trait]
    impl CertificateRepo for SqliteStore {
        async fn upsert_certificate(
            &self,
            record: &CertificateRecord,
            now: OffsetDateTime,
        ) -> MetadataResult<UpsertOutcome> {
            let mut tx = self.pool.begin().await?;

            let existing = sqlx::query_as::<_, CertificateRow>(
                "SELECT * FROM certificates WHERE cert_key = ?",
            )
            .bind(&record.cert_key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = &existing
                && existing.matches_record(record)
            {
                sqlx::query(
                    "UPDATE certificates SET last_synced_at = ?, source = ? WHERE certificate_id = ?",
                )
                .bind(record.last_synced_at)
                .bind(record.source.as_str())
                .bind(existing.certificate_id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                return Ok(UpsertOutcome::Unchanged(existing.certificate_id));
            }

            let row = CertificateRow::from_record(record, now);
            let certificate_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO certificates (
                    certificate_id, cert_key, kind, common_name, serial_number, alias,
                    subject, issuer, server_hostname, application_name, environment,
                    keystore_path, keystore_type, signature_algorithm, fingerprint_sha256,
                    valid_from, valid_to, expiry_error, source, external_id,
                    is_active, is_monitored, last_synced_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(cert_key) DO UPDATE SET
                    kind = excluded.kind,
                    common_name = excluded.common_name,
                    serial_number = excluded.serial_number,
                    alias = excluded.alias,
                    subject = excluded.subject,
                    issuer = excluded.issuer,
                    server_hostname = excluded.server_hostname,
                    application_name = excluded.application_name,
                    environment = excluded.environment,
                    keystore_path = excluded.keystore_path,
                    keystore_type = excluded.keystore_type,
                    signature_algorithm = excluded.signature_algorithm,
                    fingerprint_sha256 = excluded.fingerprint_sha256,
                    valid_from = excluded.valid_from,
                    valid_to = excluded.valid_to,
                    expiry_error = excluded.expiry_error,
                    source = excluded.source,
                    external_id = excluded.external_id,
                    is_active = excluded.is_active,
                    is_monitored = excluded.is_monitored,
                    last_synced_at = excluded.last_synced_at,
                    updated_at = excluded.updated_at
                RETURNING certificate_id
                "#,
            )
            .bind(row.certificate_id)
            .bind(&row.cert_key)
            .bind(&row.kind)
            .bind(&row.common_name)
            .bind(&row.serial_number)
            .bind(&row.alias)
            .bind(&row.subject)
            .bind(&row.issuer)
            .bind(&row.server_hostname)
            .bind(&row.application_name)
            .bind(&row.environment)
            .bind(&row.keystore_path)
            .bind(&row.keystore_type)
            .bind(&row.signature_algorithm)
            .bind(&row.fingerprint_sha256)
            .bind(row.valid_from)
            .bind(row.valid_to)
            .bind(&row.expiry_error)
            .bind(&row.source)
            .bind(&row.external_id)
            .bind(row.is_active)
            .bind(row.is_monitored)
            .bind(row.last_synced_at)
            .bind(row.created_at)
            .bind(row.updated_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok(match existing {
                Some(_) => UpsertOutcome::Updated(certificate_id),
                None => UpsertOutcome::Created(certificate_id),
            })
        }

        async fn get_certificate(
            &self,
            certificate_id: Uuid,
        ) -> MetadataResult<Option<CertificateRow>> {
            let row = sqlx::query_as::<_, CertificateRow>(
                "SELECT * FROM certificates WHERE certificate_id = ?",
            )
            .bind(certificate_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_certificate_by_key(
            &self,
            cert_key: &str,
        ) -> MetadataResult<Option<CertificateRow>> {
            let row = sqlx::query_as::<_, CertificateRow>(
                "SELECT * FROM certificates WHERE cert_key = ?",
            )
            .bind(cert_key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_certificates(
            &self,
            filter: &CertificateFilter,
        ) -> MetadataResult<Vec<CertificateRow>> {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM certificates WHERE 1 = 1");
            if let Some(kind) = &filter.kind {
                qb.push(" AND kind = ").push_bind(kind.clone());
            }
            if let Some(environment) = &filter.environment {
                qb.push(" AND environment = ")
                    .push_bind(environment.to_lowercase());
            }
            if let Some(server) = &filter.server {
                qb.push(" AND server_hostname LIKE '%' || ")
                    .push_bind(server.to_lowercase())
                    .push(" || '%'");
            }
            if let Some(before) = filter.expiring_before {
                qb.push(" AND valid_to IS NOT NULL AND julianday(valid_to) <= julianday(")
                    .push_bind(before)
                    .push(")");
            }
            match filter.invalid {
                Some(true) => {
                    qb.push(" AND valid_to IS NULL");
                }
                Some(false) => {
                    qb.push(" AND valid_to IS NOT NULL");
                }
                None => {}
            }
            if filter.active_only {
                qb.push(" AND is_active = 1");
            }
            qb.push(" ORDER BY valid_to IS NULL, julianday(valid_to), common_name");
            if filter.limit > 0 {
                qb.push(" LIMIT ")
                    .push_bind(i64::from(filter.limit))
                    .push(" OFFSET ")
                    .push_bind(i64::from(filter.offset));
            }

            let rows = qb
                .build_query_as::<CertificateRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn list_alertable_certificates(&self) -> MetadataResult<Vec<CertificateRow>> {
            let rows = sqlx::query_as::<_, CertificateRow>(
                "SELECT * FROM certificates WHERE is_active = 1 AND is_monitored = 1 ORDER BY cert_key",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn certificate_stats(&self, now: OffsetDateTime) -> MetadataResult<CertificateStats> {
            let horizon = now + time::Duration::days(30);
            let rows: Vec<(String, i64, i64, i64, i64)> = sqlx::query_as(
                r#"
                SELECT
                    kind,
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN valid_to IS NOT NULL
                        AND julianday(valid_to) < julianday(?) THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN valid_to IS NOT NULL
                        AND julianday(valid_to) >= julianday(?)
                        AND julianday(valid_to) <= julianday(?) THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN valid_to IS NULL THEN 1 ELSE 0 END), 0)
                FROM certificates
                WHERE is_active = 1
                GROUP BY kind
                "#,
            )
            .bind(now)
            .bind(now)
            .bind(horizon)
            .fetch_all(&self.pool)
            .await?;
            Ok(stats_from_rows(rows))
        }
    }

    #[async_trait]
    impl NotificationRepo for SqliteStore {
        async fn claim_notification(
            &self,
            claim: &NotificationRow,
        ) -> MetadataResult<ClaimOutcome> {
            // Free slot: insert. Failed slot: reset to pending. Pending or sent:
            // the WHERE clause suppresses the update and nothing is returned.
            let claimed: Option<Uuid> = sqlx::query_scalar(
                r#"
                INSERT INTO notifications (
                    notification_id, certificate_id, tier, cycle_key, recipients,
                    subject, state, error_message, created_at, sent_at
                ) VALUES (?, ?, ?, ?, ?, ?, 'pending', NULL, ?, NULL)
                ON CONFLICT(certificate_id, tier, cycle_key) DO UPDATE SET
                    state = 'pending',
                    error_message = NULL,
                    recipients = excluded.recipients,
                    subject = excluded.subject,
                    created_at = excluded.created_at
                WHERE notifications.state = 'failed'
                RETURNING notification_id
                "#,
            )
            .bind(claim.notification_id)
            .bind(claim.certificate_id)
            .bind(&claim.tier)
            .bind(&claim.cycle_key)
            .bind(&claim.recipients)
            .bind(&claim.subject)
            .bind(claim.created_at)
            .fetch_optional(&self.pool)
            .await?;

            Ok(match claimed {
                Some(id) => ClaimOutcome::Claimed(id),
                None => ClaimOutcome::AlreadyClaimed,
            })
        }

        async fn has_recent_notification(
            &self,
            certificate_id: Uuid,
            tier: &str,
            since: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM notifications
                    WHERE certificate_id = ? AND tier = ?
                      AND state IN ('pending', 'sent')
                      AND julianday(created_at) >= julianday(?)
                )
                "#,
            )
            .bind(certificate_id)
            .bind(tier)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn mark_notification_sent(
            &self,
            notification_id: Uuid,
            sent_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE notifications SET state = 'sent', sent_at = ?, error_message = NULL WHERE notification_id = ?",
            )
            .bind(sent_at)
            .bind(notification_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn mark_notification_failed(
            &self,
            notification_id: Uuid,
            error_message: &str,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE notifications SET state = 'failed', error_message = ? WHERE notification_id = ?",
            )
            .bind(error_message)
            .bind(notification_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_notifications_for_certificate(
            &self,
            certificate_id: Uuid,
        ) -> MetadataResult<Vec<NotificationRow>> {
            let rows = sqlx::query_as::<_, NotificationRow>(
                "SELECT * FROM notifications WHERE certificate_id = ? ORDER BY julianday(created_at) DESC",
            )
            .bind(certificate_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_notifications_since(
            &self,
            since: OffsetDateTime,
        ) -> MetadataResult<Vec<NotificationRow>> {
            let rows = sqlx::query_as::<_, NotificationRow>(
                r#"
                SELECT * FROM notifications
                WHERE julianday(created_at) >= julianday(?)
                ORDER BY julianday(created_at) DESC
                "#,
            )
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl JobRepo for SqliteStore {
        async fn create_job(&self, job: &JobRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                INSERT INTO jobs (job_id, job_type, triggered_by, state, dry_run, started_at, finished_at, stats_json, error)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(job.job_id)
            .bind(&job.job_type)
            .bind(&job.triggered_by)
            .bind(&job.state)
            .bind(job.dry_run)
            .bind(job.started_at)
            .bind(job.finished_at)
            .bind(&job.stats_json)
            .bind(&job.error)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                // The partial unique index on active jobs is the only unique
                // constraint an insert with a fresh ID can hit.
                Err(e) if is_unique_violation(&e) => Err(MetadataError::Constraint(format!(
                    "a {} job is already active",
                    job.job_type
                ))),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>> {
            let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn update_job_state(
            &self,
            job_id: Uuid,
            state: &str,
            finished_at: Option<OffsetDateTime>,
            stats_json: Option<&str>,
            error: Option<&str>,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE jobs SET state = ?, finished_at = ?, stats_json = ?, error = ? WHERE job_id = ?",
            )
            .bind(state)
            .bind(finished_at)
            .bind(stats_json)
            .bind(error)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_recent_jobs(
            &self,
            job_type: Option<&str>,
            limit: u32,
        ) -> MetadataResult<Vec<JobRow>> {
            let rows = match job_type {
                Some(job_type) => {
                    sqlx::query_as::<_, JobRow>(
                        "SELECT * FROM jobs WHERE job_type = ? ORDER BY julianday(started_at) DESC LIMIT ?",
                    )
                    .bind(job_type)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, JobRow>(
                        "SELECT * FROM jobs ORDER BY julianday(started_at) DESC LIMIT ?",
                    )
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }

        async fn get_active_jobs(&self, job_type: &str) -> MetadataResult<Vec<JobRow>> {
            let rows = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM jobs WHERE job_type = ? AND state IN ('queued', 'running')",
            )
            .bind(job_type)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_orphaned_jobs(&self) -> MetadataResult<Vec<JobRow>> {
            let rows = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM jobs WHERE state IN ('queued', 'running')",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn last_finished_job(&self, job_type: &str) -> MetadataResult<Option<JobRow>> {
            let row = sqlx::query_as::<_, JobRow>(
                r#"
                SELECT * FROM jobs
                WHERE job_type = ? AND state = 'finished' AND dry_run = 0
                ORDER BY julianday(finished_at) DESC
                LIMIT 1
                "#,
            )
            .bind(job_type)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl AnnouncementRepo for SqliteStore {
        async fn create_announcement(&self, a: &AnnouncementRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO announcements (
                    announcement_id, title, slug, content, summary, kind, priority, status,
                    pinned, related_system, category_id, owner, work_date, published_at,
                    expires_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(a.announcement_id)
            .bind(&a.title)
            .bind(&a.slug)
            .bind(&a.content)
            .bind(&a.summary)
            .bind(&a.kind)
            .bind(&a.priority)
            .bind(&a.status)
            .bind(a.pinned)
            .bind(&a.related_system)
            .bind(a.category_id)
            .bind(&a.owner)
            .bind(a.work_date)
            .bind(a.published_at)
            .bind(a.expires_at)
            .bind(a.created_at)
            .bind(a.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_duplicate(e, || format!("announcement slug '{}'", a.slug)))?;
            Ok(())
        }

        async fn get_announcement(
            &self,
            announcement_id: Uuid,
        ) -> MetadataResult<Option<AnnouncementRow>> {
            let row = sqlx::query_as::<_, AnnouncementRow>(
                "SELECT * FROM announcements WHERE announcement_id = ?",
            )
            .bind(announcement_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_announcement_by_slug(
            &self,
            slug: &str,
        ) -> MetadataResult<Option<AnnouncementRow>> {
            let row =
                sqlx::query_as::<_, AnnouncementRow>("SELECT * FROM announcements WHERE slug = ?")
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn slug_exists(&self, slug: &str) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM announcements WHERE slug = ?)")
                    .bind(slug)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn update_announcement(&self, a: &AnnouncementRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE announcements SET
                    title = ?, content = ?, summary = ?, kind = ?, priority = ?, pinned = ?,
                    related_system = ?, category_id = ?, work_date = ?, expires_at = ?,
                    updated_at = ?
                WHERE announcement_id = ? AND status <> 'archived'
                "#,
            )
            .bind(&a.title)
            .bind(&a.content)
            .bind(&a.summary)
            .bind(&a.kind)
            .bind(&a.priority)
            .bind(a.pinned)
            .bind(&a.related_system)
            .bind(a.category_id)
            .bind(a.work_date)
            .bind(a.expires_at)
            .bind(a.updated_at)
            .bind(a.announcement_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 1 {
                return Ok(());
            }

            let exists: Option<String> =
                sqlx::query_scalar("SELECT status FROM announcements WHERE announcement_id = ?")
                    .bind(a.announcement_id)
                    .fetch_optional(&self.pool)
                    .await?;
            match exists {
                None => Err(MetadataError::NotFound(format!(
                    "announcement {}",
                    a.announcement_id
                ))),
                Some(_) => Err(MetadataError::Constraint(format!(
                    "announcement {} is archived and read-only",
                    a.announcement_id
                ))),
            }
        }

        async fn delete_announcement(&self, announcement_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM announcements WHERE announcement_id = ?")
                .bind(announcement_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "announcement {announcement_id}"
                )));
            }
            Ok(())
        }

        async fn list_announcements(
            &self,
            filter: &AnnouncementFilter,
        ) -> MetadataResult<Vec<AnnouncementRow>> {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM announcements WHERE 1 = 1");
            if let Some(status) = &filter.status {
                qb.push(" AND status = ").push_bind(status.clone());
            }
            if let Some(kind) = &filter.kind {
                qb.push(" AND kind = ").push_bind(kind.clone());
            }
            if let Some(category_id) = filter.category_id {
                qb.push(" AND category_id = ").push_bind(category_id);
            }
            if let Some(pinned) = filter.pinned {
                qb.push(" AND pinned = ").push_bind(pinned);
            }
            qb.push(" ORDER BY pinned DESC, julianday(created_at) DESC");
            if filter.limit > 0 {
                qb.push(" LIMIT ")
                    .push_bind(i64::from(filter.limit))
                    .push(" OFFSET ")
                    .push_bind(i64::from(filter.offset));
            }
            let rows = qb
                .build_query_as::<AnnouncementRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn list_expired_announcements(
            &self,
            now: OffsetDateTime,
        ) -> MetadataResult<Vec<AnnouncementRow>> {
            let rows = sqlx::query_as::<_, AnnouncementRow>(
                r#"
                SELECT * FROM announcements
                WHERE status = 'published'
                  AND expires_at IS NOT NULL
                  AND julianday(expires_at) <= julianday(?)
                ORDER BY julianday(expires_at)
                "#,
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn announcement_counts(&self) -> MetadataResult<BTreeMap<String, u64>> {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM announcements GROUP BY status",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(status, count)| (status, u64::try_from(count).unwrap_or_default()))
                .collect())
        }
    }

    #[async_trait]
    impl ContentRepo for SqliteStore {
        async fn create_category(&self, c: &CategoryRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO categories (
                    category_id, name, description, color, position, status, owner,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(c.category_id)
            .bind(&c.name)
            .bind(&c.description)
            .bind(&c.color)
            .bind(c.position)
            .bind(&c.status)
            .bind(&c.owner)
            .bind(c.created_at)
            .bind(c.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_duplicate(e, || format!("category '{}'", c.name)))?;
            Ok(())
        }

        async fn get_category(&self, category_id: Uuid) -> MetadataResult<Option<CategoryRow>> {
            let row =
                sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE category_id = ?")
                    .bind(category_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_categories(&self, status: Option<&str>) -> MetadataResult<Vec<CategoryRow>> {
            let rows = match status {
                Some(status) => {
                    sqlx::query_as::<_, CategoryRow>(
                        "SELECT * FROM categories WHERE status = ? ORDER BY position, name",
                    )
                    .bind(status)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, CategoryRow>(
                        "SELECT * FROM categories ORDER BY position, name",
                    )
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }

        async fn delete_category(&self, category_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM categories WHERE category_id = ?")
                .bind(category_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("category {category_id}")));
            }
            Ok(())
        }

        async fn create_link(&self, l: &LinkRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO links (
                    link_id, title, url, description, category_id, is_internal, requires_vpn,
                    status, owner, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(l.link_id)
            .bind(&l.title)
            .bind(&l.url)
            .bind(&l.description)
            .bind(l.category_id)
            .bind(l.is_internal)
            .bind(l.requires_vpn)
            .bind(&l.status)
            .bind(&l.owner)
            .bind(l.created_at)
            .bind(l.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_link(&self, link_id: Uuid) -> MetadataResult<Option<LinkRow>> {
            let row = sqlx::query_as::<_, LinkRow>("SELECT * FROM links WHERE link_id = ?")
                .bind(link_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_links(
            &self,
            status: Option<&str>,
            category_id: Option<Uuid>,
        ) -> MetadataResult<Vec<LinkRow>> {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM links WHERE 1 = 1");
            if let Some(status) = status {
                qb.push(" AND status = ").push_bind(status.to_string());
            }
            if let Some(category_id) = category_id {
                qb.push(" AND category_id = ").push_bind(category_id);
            }
            qb.push(" ORDER BY title");
            let rows = qb.build_query_as::<LinkRow>().fetch_all(&self.pool).await?;
            Ok(rows)
        }

        async fn delete_link(&self, link_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM links WHERE link_id = ?")
                .bind(link_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("link {link_id}")));
            }
            Ok(())
        }

        async fn create_inventory_item(&self, item: &InventoryRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO inventory_items (
                    item_id, hostname, item_type, environment, description, status, owner,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(item.item_id)
            .bind(&item.hostname)
            .bind(&item.item_type)
            .bind(&item.environment)
            .bind(&item.description)
            .bind(&item.status)
            .bind(&item.owner)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_duplicate(e, || format!("inventory hostname '{}'", item.hostname)))?;
            Ok(())
        }

        async fn get_inventory_item(&self, item_id: Uuid) -> MetadataResult<Option<InventoryRow>> {
            let row = sqlx::query_as::<_, InventoryRow>(
                "SELECT * FROM inventory_items WHERE item_id = ?",
            )
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_inventory(
            &self,
            status: Option<&str>,
            item_type: Option<&str>,
        ) -> MetadataResult<Vec<InventoryRow>> {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM inventory_items WHERE 1 = 1");
            if let Some(status) = status {
                qb.push(" AND status = ").push_bind(status.to_string());
            }
            if let Some(item_type) = item_type {
                qb.push(" AND item_type = ").push_bind(item_type.to_string());
            }
            qb.push(" ORDER BY hostname");
            let rows = qb
                .build_query_as::<InventoryRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn delete_inventory_item(&self, item_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM inventory_items WHERE item_id = ?")
                .bind(item_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("inventory item {item_id}")));
            }
            Ok(())
        }

        async fn transition_status(
            &self,
            table: ContentTable,
            id: Uuid,
            from: &str,
            to: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let stamp_published = table == ContentTable::Announcements && to == "published";
            let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET status = ", table.table()));
            qb.push_bind(to.to_string());
            qb.push(", updated_at = ").push_bind(now);
            if stamp_published {
                qb.push(", published_at = COALESCE(published_at, ")
                    .push_bind(now)
                    .push(")");
            }
            qb.push(format!(" WHERE {} = ", table.id_column()))
                .push_bind(id)
                .push(" AND status = ")
                .push_bind(from.to_string());

            let result = qb.build().execute(&self.pool).await?;
            if result.rows_affected() == 1 {
                return Ok(());
            }

            let select = format!(
                "SELECT status FROM {} WHERE {} = ?",
                table.table(),
                table.id_column()
            );
            let current: Option<String> = sqlx::query_scalar(&select)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            match current {
                None => Err(MetadataError::NotFound(format!("{} {id}", table.entity()))),
                Some(current) => Err(MetadataError::InvalidStateTransition {
                    from: current,
                    to: to.to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl DutyRepo for SqliteStore {
        async fn upsert_duty(
            &self,
            entry: &DutyEntry,
            source: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<DutyUpsert> {
            let mut tx = self.pool.begin().await?;

            let existing =
                sqlx::query_as::<_, DutyRow>("SELECT * FROM duty_roster WHERE duty_date = ?")
                    .bind(entry.duty_date)
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some(existing) = &existing
                && existing.matches_entry(entry)
            {
                sqlx::query("UPDATE duty_roster SET synced_at = ?, source = ? WHERE duty_date = ?")
                    .bind(now)
                    .bind(source)
                    .bind(entry.duty_date)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                return Ok(DutyUpsert::Unchanged);
            }

            sqlx::query(
                r#"
                INSERT INTO duty_roster (
                    duty_date, name, phone, email, notes, source, synced_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(duty_date) DO UPDATE SET
                    name = excluded.name,
                    phone = excluded.phone,
                    email = excluded.email,
                    notes = excluded.notes,
                    source = excluded.source,
                    synced_at = excluded.synced_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(entry.duty_date)
            .bind(&entry.name)
            .bind(&entry.phone)
            .bind(&entry.email)
            .bind(&entry.notes)
            .bind(source)
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            Ok(match existing {
                Some(_) => DutyUpsert::Updated,
                None => DutyUpsert::Created,
            })
        }

        async fn get_duty(&self, duty_date: Date) -> MetadataResult<Option<DutyRow>> {
            let row = sqlx::query_as::<_, DutyRow>("SELECT * FROM duty_roster WHERE duty_date = ?")
                .bind(duty_date)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn next_duty_after(&self, duty_date: Date) -> MetadataResult<Option<DutyRow>> {
            let row = sqlx::query_as::<_, DutyRow>(
                "SELECT * FROM duty_roster WHERE duty_date > ? ORDER BY duty_date LIMIT 1",
            )
            .bind(duty_date)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_duties(&self, from: Date, to: Date) -> MetadataResult<Vec<DutyRow>> {
            let rows = sqlx::query_as::<_, DutyRow>(
                "SELECT * FROM duty_roster WHERE duty_date >= ? AND duty_date <= ? ORDER BY duty_date",
            )
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_duties_before(&self, duty_date: Date) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM duty_roster WHERE duty_date < ?")
                .bind(duty_date)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl SessionRepo for SqliteStore {
        async fn create_session(&self, session: &SessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sessions (
                    session_id, session_hash, username, scopes, csrf_token, expires_at,
                    revoked_at, created_at, last_seen_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session.session_id)
            .bind(&session.session_hash)
            .bind(&session.username)
            .bind(&session.scopes)
            .bind(&session.csrf_token)
            .bind(session.expires_at)
            .bind(session.revoked_at)
            .bind(session.created_at)
            .bind(session.last_seen_at)
            .bind(&session.description)
            .execute(&self.pool)
            .await
            .map_err(|e| map_duplicate(e, || "session secret".to_string()))?;
            Ok(())
        }

        async fn get_session_by_hash(
            &self,
            session_hash: &str,
        ) -> MetadataResult<Option<SessionRow>> {
            let row =
                sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_hash = ?")
                    .bind(session_hash)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn get_session(&self, session_id: Uuid) -> MetadataResult<Option<SessionRow>> {
            let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_session(
            &self,
            session_id: Uuid,
            seen_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE sessions SET last_seen_at = ? WHERE session_id = ?")
                .bind(seen_at)
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_session(
            &self,
            session_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE sessions SET revoked_at = COALESCE(revoked_at, ?) WHERE session_id = ?",
            )
            .bind(revoked_at)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("session {session_id}")));
            }
            Ok(())
        }

        async fn list_sessions(&self) -> MetadataResult<Vec<SessionRow>> {
            let rows = sqlx::query_as::<_, SessionRow>(
                "SELECT * FROM sessions ORDER BY julianday(created_at) DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_session_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> = sqlx::query_scalar(
                "SELECT bootstrap_session_id FROM bootstrap_state WHERE id = 1",
            )
            .fetch_optional(&self.pool)
            .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid bootstrap_session_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn set_bootstrap_session_id(&self, session_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_session_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_session_id = excluded.bootstrap_session_id
                "#,
            )
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn clear_bootstrap_session_id(&self) -> MetadataResult<()> {
            sqlx::query("UPDATE bootstrap_state SET bootstrap_session_id = NULL WHERE id = 1")
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Certificates, one row per natural key
CREATE TABLE IF NOT EXISTS certificates (
    certificate_id BLOB PRIMARY KEY,
    cert_key TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    common_name TEXT NOT NULL,
    serial_number TEXT,
    alias TEXT,
    subject TEXT,
    issuer TEXT,
    server_hostname TEXT,
    application_name TEXT,
    environment TEXT,
    keystore_path TEXT,
    keystore_type TEXT,
    signature_algorithm TEXT,
    fingerprint_sha256 TEXT,
    valid_from TEXT,
    valid_to TEXT,
    expiry_error TEXT,
    source TEXT NOT NULL,
    external_id TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_monitored INTEGER NOT NULL DEFAULT 1,
    last_synced_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK ((valid_to IS NULL) = (expiry_error IS NOT NULL))
);
CREATE INDEX IF NOT EXISTS idx_certificates_kind ON certificates(kind);
CREATE INDEX IF NOT EXISTS idx_certificates_valid_to ON certificates(valid_to);
CREATE INDEX IF NOT EXISTS idx_certificates_environment ON certificates(environment);
CREATE INDEX IF NOT EXISTS idx_certificates_host ON certificates(server_hostname);

-- Alert notifications: claim slot per (certificate, tier, cycle)
CREATE TABLE IF NOT EXISTS notifications (
    notification_id BLOB PRIMARY KEY,
    certificate_id BLOB NOT NULL REFERENCES certificates(certificate_id) ON DELETE CASCADE,
    tier TEXT NOT NULL,
    cycle_key TEXT NOT NULL,
    recipients TEXT NOT NULL,
    subject TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    created_at TEXT NOT NULL,
    sent_at TEXT,
    UNIQUE(certificate_id, tier, cycle_key)
);
CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at);

-- Background jobs
CREATE TABLE IF NOT EXISTS jobs (
    job_id BLOB PRIMARY KEY,
    job_type TEXT NOT NULL,
    triggered_by TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'queued',
    dry_run INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    finished_at TEXT,
    stats_json TEXT,
    error TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
-- One queued or running job per type
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_type_active
ON jobs(job_type)
WHERE state IN ('queued', 'running');

-- Portal content
CREATE TABLE IF NOT EXISTS categories (
    category_id BLOB PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    color TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'draft',
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS announcements (
    announcement_id BLOB PRIMARY KEY,
    title TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    summary TEXT,
    kind TEXT NOT NULL,
    priority TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    pinned INTEGER NOT NULL DEFAULT 0,
    related_system TEXT,
    category_id BLOB REFERENCES categories(category_id) ON DELETE SET NULL,
    owner TEXT NOT NULL,
    work_date TEXT,
    published_at TEXT,
    expires_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_announcements_status ON announcements(status);

CREATE TABLE IF NOT EXISTS links (
    link_id BLOB PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    description TEXT,
    category_id BLOB REFERENCES categories(category_id) ON DELETE SET NULL,
    is_internal INTEGER NOT NULL DEFAULT 1,
    requires_vpn INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'draft',
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory_items (
    item_id BLOB PRIMARY KEY,
    hostname TEXT NOT NULL UNIQUE,
    item_type TEXT NOT NULL,
    environment TEXT,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- On-call roster, one row per day
CREATE TABLE IF NOT EXISTS duty_roster (
    duty_date TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT,
    email TEXT,
    notes TEXT,
    source TEXT NOT NULL,
    synced_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Sessions
CREATE TABLE IF NOT EXISTS sessions (
    session_id BLOB PRIMARY KEY,
    session_hash TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    scopes TEXT NOT NULL,
    csrf_token TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_seen_at TEXT,
    description TEXT
);

-- Bootstrap admin session marker
CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_session_id TEXT
);
INSERT OR IGNORE INTO bootstrap_state (id, bootstrap_session_id) VALUES (1, NULL);
"#;
