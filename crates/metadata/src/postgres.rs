//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, map_duplicate};
use crate::models::*;
use crate::repos::{
    AnnouncementRepo, BootstrapRepo, CertificateRepo, ContentRepo, DutyRepo, JobRepo,
    NotificationRepo, SessionRepo,
};
use crate::store::{MetadataStore, stats_from_rows};
use async_trait::async_trait;
use portall_core::{CertificateRecord, DutyEntry};
use portall_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use std::str::FromStr;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters,
    /// so the password can come from the environment.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!(timeout_ms, "PostgreSQL statement_timeout set");
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements hold one command each.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CertificateRepo for PostgresStore {
    async fn upsert_certificate(
        &self,
        record: &CertificateRecord,
        now: OffsetDateTime,
    ) -> MetadataResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE cert_key = $1 FOR UPDATE",
        )
        .bind(&record.cert_key)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = &existing
            && existing.matches_record(record)
        {
            sqlx::query(
                "UPDATE certificates SET last_synced_at = $1, source = $2 WHERE certificate_id = $3",
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
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )
            ON CONFLICT (cert_key) DO UPDATE SET
                kind = EXCLUDED.kind,
                common_name = EXCLUDED.common_name,
                serial_number = EXCLUDED.serial_number,
                alias = EXCLUDED.alias,
                subject = EXCLUDED.subject,
                issuer = EXCLUDED.issuer,
                server_hostname = EXCLUDED.server_hostname,
                application_name = EXCLUDED.application_name,
                environment = EXCLUDED.environment,
                keystore_path = EXCLUDED.keystore_path,
                keystore_type = EXCLUDED.keystore_type,
                signature_algorithm = EXCLUDED.signature_algorithm,
                fingerprint_sha256 = EXCLUDED.fingerprint_sha256,
                valid_from = EXCLUDED.valid_from,
                valid_to = EXCLUDED.valid_to,
                expiry_error = EXCLUDED.expiry_error,
                source = EXCLUDED.source,
                external_id = EXCLUDED.external_id,
                is_active = EXCLUDED.is_active,
                is_monitored = EXCLUDED.is_monitored,
                last_synced_at = EXCLUDED.last_synced_at,
                updated_at = EXCLUDED.updated_at
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

    async fn get_certificate(&self, certificate_id: Uuid) -> MetadataResult<Option<CertificateRow>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE certificate_id = $1",
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
        let row =
            sqlx::query_as::<_, CertificateRow>("SELECT * FROM certificates WHERE cert_key = $1")
                .bind(cert_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> MetadataResult<Vec<CertificateRow>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM certificates WHERE TRUE");
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
            qb.push(" AND valid_to IS NOT NULL AND valid_to <= ")
                .push_bind(before);
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
            qb.push(" AND is_active");
        }
        qb.push(" ORDER BY valid_to ASC NULLS LAST, common_name");
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
            "SELECT * FROM certificates WHERE is_active AND is_monitored ORDER BY cert_key",
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
                COALESCE(SUM(CASE WHEN valid_to IS NOT NULL AND valid_to < $1
                    THEN 1 ELSE 0 END), 0)::BIGINT,
                COALESCE(SUM(CASE WHEN valid_to IS NOT NULL AND valid_to >= $1
                    AND valid_to <= $2 THEN 1 ELSE 0 END), 0)::BIGINT,
                COALESCE(SUM(CASE WHEN valid_to IS NULL THEN 1 ELSE 0 END), 0)::BIGINT
            FROM certificates
            WHERE is_active
            GROUP BY kind
            "#,
        )
        .bind(now)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(stats_from_rows(rows))
    }
}

#[async_trait]
impl NotificationRepo for PostgresStore {
    async fn claim_notification(&self, claim: &NotificationRow) -> MetadataResult<ClaimOutcome> {
        let claimed: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (
                notification_id, certificate_id, tier, cycle_key, recipients,
                subject, state, error_message, created_at, sent_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'pending', NULL, $7, NULL)
            ON CONFLICT (certificate_id, tier, cycle_key) DO UPDATE SET
                state = 'pending',
                error_message = NULL,
                recipients = EXCLUDED.recipients,
                subject = EXCLUDED.subject,
                created_at = EXCLUDED.created_at
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
                WHERE certificate_id = $1 AND tier = $2
                  AND state IN ('pending', 'sent')
                  AND created_at >= $3
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
            "UPDATE notifications SET state = 'sent', sent_at = $1, error_message = NULL WHERE notification_id = $2",
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
            "UPDATE notifications SET state = 'failed', error_message = $1 WHERE notification_id = $2",
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
            "SELECT * FROM notifications WHERE certificate_id = $1 ORDER BY created_at DESC",
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
            "SELECT * FROM notifications WHERE created_at >= $1 ORDER BY created_at DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl JobRepo for PostgresStore {
    async fn create_job(&self, job: &JobRow) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, job_type, triggered_by, state, dry_run, started_at, finished_at, stats_json, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some("idx_jobs_type_active") =>
            {
                Err(MetadataError::Constraint(format!(
                    "a {} job is already active",
                    job.job_type
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = $1")
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
            "UPDATE jobs SET state = $1, finished_at = $2, stats_json = $3, error = $4 WHERE job_id = $5",
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
                    "SELECT * FROM jobs WHERE job_type = $1 ORDER BY started_at DESC LIMIT $2",
                )
                .bind(job_type)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY started_at DESC LIMIT $1")
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    async fn get_active_jobs(&self, job_type: &str) -> MetadataResult<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE job_type = $1 AND state IN ('queued', 'running')",
        )
        .bind(job_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_orphaned_jobs(&self) -> MetadataResult<Vec<JobRow>> {
        let rows =
            sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE state IN ('queued', 'running')")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn last_finished_job(&self, job_type: &str) -> MetadataResult<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE job_type = $1 AND state = 'finished' AND NOT dry_run
            ORDER BY finished_at DESC
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
impl AnnouncementRepo for PostgresStore {
    async fn create_announcement(&self, a: &AnnouncementRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO announcements (
                announcement_id, title, slug, content, summary, kind, priority, status,
                pinned, related_system, category_id, owner, work_date, published_at,
                expires_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
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
            "SELECT * FROM announcements WHERE announcement_id = $1",
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
        let row = sqlx::query_as::<_, AnnouncementRow>("SELECT * FROM announcements WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn slug_exists(&self, slug: &str) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM announcements WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn update_announcement(&self, a: &AnnouncementRow) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE announcements SET
                title = $1, content = $2, summary = $3, kind = $4, priority = $5, pinned = $6,
                related_system = $7, category_id = $8, work_date = $9, expires_at = $10,
                updated_at = $11
            WHERE announcement_id = $12 AND status <> 'archived'
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
            sqlx::query_scalar("SELECT status FROM announcements WHERE announcement_id = $1")
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
        let result = sqlx::query("DELETE FROM announcements WHERE announcement_id = $1")
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
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM announcements WHERE TRUE");
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
        qb.push(" ORDER BY pinned DESC, created_at DESC");
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
            WHERE status = 'published' AND expires_at IS NOT NULL AND expires_at <= $1
            ORDER BY expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn announcement_counts(&self) -> MetadataResult<BTreeMap<String, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*)::BIGINT FROM announcements GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(status, count)| (status, u64::try_from(count).unwrap_or_default()))
            .collect())
    }
}

#[async_trait]
impl ContentRepo for PostgresStore {
    async fn create_category(&self, c: &CategoryRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (
                category_id, name, description, color, position, status, owner,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE category_id = $1")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_categories(&self, status: Option<&str>) -> MetadataResult<Vec<CategoryRow>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, CategoryRow>(
                    "SELECT * FROM categories WHERE status = $1 ORDER BY position, name",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY position, name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    async fn delete_category(&self, category_id: Uuid) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE category_id = $1")
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
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
        let row = sqlx::query_as::<_, LinkRow>("SELECT * FROM links WHERE link_id = $1")
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
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM links WHERE TRUE");
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
        let result = sqlx::query("DELETE FROM links WHERE link_id = $1")
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row =
            sqlx::query_as::<_, InventoryRow>("SELECT * FROM inventory_items WHERE item_id = $1")
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
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM inventory_items WHERE TRUE");
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
        let result = sqlx::query("DELETE FROM inventory_items WHERE item_id = $1")
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
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("UPDATE {} SET status = ", table.table()));
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
            "SELECT status FROM {} WHERE {} = $1",
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
impl DutyRepo for PostgresStore {
    async fn upsert_duty(
        &self,
        entry: &DutyEntry,
        source: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<DutyUpsert> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, DutyRow>(
            "SELECT * FROM duty_roster WHERE duty_date = $1 FOR UPDATE",
        )
        .bind(entry.duty_date)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = &existing
            && existing.matches_entry(entry)
        {
            sqlx::query("UPDATE duty_roster SET synced_at = $1, source = $2 WHERE duty_date = $3")
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $7)
            ON CONFLICT (duty_date) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email,
                notes = EXCLUDED.notes,
                source = EXCLUDED.source,
                synced_at = EXCLUDED.synced_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(entry.duty_date)
        .bind(&entry.name)
        .bind(&entry.phone)
        .bind(&entry.email)
        .bind(&entry.notes)
        .bind(source)
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
        let row = sqlx::query_as::<_, DutyRow>("SELECT * FROM duty_roster WHERE duty_date = $1")
            .bind(duty_date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn next_duty_after(&self, duty_date: Date) -> MetadataResult<Option<DutyRow>> {
        let row = sqlx::query_as::<_, DutyRow>(
            "SELECT * FROM duty_roster WHERE duty_date > $1 ORDER BY duty_date LIMIT 1",
        )
        .bind(duty_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_duties(&self, from: Date, to: Date) -> MetadataResult<Vec<DutyRow>> {
        let rows = sqlx::query_as::<_, DutyRow>(
            "SELECT * FROM duty_roster WHERE duty_date BETWEEN $1 AND $2 ORDER BY duty_date",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_duties_before(&self, duty_date: Date) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM duty_roster WHERE duty_date < $1")
            .bind(duty_date)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionRepo for PostgresStore {
    async fn create_session(&self, session: &SessionRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, session_hash, username, scopes, csrf_token, expires_at,
                revoked_at, created_at, last_seen_at, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
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

    async fn get_session_by_hash(&self, session_hash: &str) -> MetadataResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_hash = $1")
            .bind(session_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_session(&self, session_id: Uuid) -> MetadataResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_session(&self, session_id: Uuid, seen_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE sessions SET last_seen_at = $1 WHERE session_id = $2")
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
            "UPDATE sessions SET revoked_at = COALESCE(revoked_at, $1) WHERE session_id = $2",
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
        let rows = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl BootstrapRepo for PostgresStore {
    async fn get_bootstrap_session_id(&self) -> MetadataResult<Option<Uuid>> {
        // Outer None: no row. Inner None: marker cleared.
        let value: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT bootstrap_session_id FROM bootstrap_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    async fn set_bootstrap_session_id(&self, session_id: Uuid) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bootstrap_state (id, bootstrap_session_id)
            VALUES (1, $1)
            ON CONFLICT(id) DO UPDATE
            SET bootstrap_session_id = EXCLUDED.bootstrap_session_id
            "#,
        )
        .bind(session_id)
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

#[cfg(test)]
mod tests {
    use super::postgres_schema_statements;

    #[test]
    fn postgres_schema_statements_skips_empty_and_comment_only() {
        let schema = r#"
            -- comment only

            CREATE TABLE foo (id int);
            ;
            -- another comment
            CREATE TABLE bar (id int);
        "#;

        let statements = postgres_schema_statements(schema);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE foo"));
        assert!(statements[1].contains("CREATE TABLE bar"));
    }

    #[test]
    fn embedded_schema_has_active_job_index() {
        let statements = postgres_schema_statements(super::POSTGRES_SCHEMA);
        assert!(
            statements
                .iter()
                .any(|s| s.contains("idx_jobs_type_active") && s.contains("WHERE state IN"))
        );
        assert!(statements.iter().all(|s| !s.trim_start().starts_with(';')));
    }
}
