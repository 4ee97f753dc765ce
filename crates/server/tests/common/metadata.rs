//! Metadata stores for integration tests.
//!
//! SQLite stores live in a temp dir dropped with the handle. PostgreSQL stores
//! run in a throwaway container and are skipped when Docker is missing.

use portall_metadata::{MetadataResult, MetadataStore, PostgresStore, SqliteStore};
use sqlx::{Pool, Postgres as PgDriver};
use std::future::Future;
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

const POSTGRES_TAG: &str = "16-alpine";

/// SQLite store in a temp dir.
#[allow(dead_code)]
pub struct TestMetadata {
    sqlite: Arc<SqliteStore>,
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let dir = tempfile::tempdir().expect("temp dir for sqlite store");
        let sqlite = SqliteStore::new(dir.path().join("portall.db")).await?;
        Ok(Self {
            sqlite: Arc::new(sqlite),
            _dir: dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.sqlite.clone()
    }
}

/// Why a PostgreSQL store could not be prepared.
enum PostgresSetup {
    /// Docker is not reachable; the test is skipped.
    Unavailable(String),
    /// The container came up but the store did not.
    Failed(String),
}

/// PostgreSQL store backed by a container that lives as long as the handle.
#[allow(dead_code)]
pub struct PostgresTestMetadata {
    postgres: Arc<PostgresStore>,
    _container: ContainerAsync<Postgres>,
}

#[allow(dead_code)]
impl PostgresTestMetadata {
    async fn start() -> Result<Self, PostgresSetup> {
        let container = Postgres::default()
            .with_tag(POSTGRES_TAG)
            .start()
            .await
            .map_err(|e| PostgresSetup::Unavailable(e.to_string()))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| PostgresSetup::Unavailable(e.to_string()))?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .map_err(|e| PostgresSetup::Unavailable(e.to_string()))?;

        // testcontainers-modules ships postgres/postgres as the superuser.
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");
        let postgres = PostgresStore::from_url(&url, 5, None)
            .await
            .map_err(|e| PostgresSetup::Failed(e.to_string()))?;

        Ok(Self {
            postgres: Arc::new(postgres),
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.postgres.clone()
    }

    /// Raw pool for assertions the repositories do not expose.
    pub fn pool(&self) -> &Pool<PgDriver> {
        self.postgres.pool()
    }
}

/// A PostgreSQL store, or `None` when `SKIP_POSTGRES_TESTS` is set or Docker
/// is unavailable. Any other setup failure panics.
#[allow(dead_code)]
pub async fn postgres_or_skip() -> Option<PostgresTestMetadata> {
    if std::env::var_os("SKIP_POSTGRES_TESTS").is_some() {
        return None;
    }
    match PostgresTestMetadata::start().await {
        Ok(metadata) => Some(metadata),
        Err(PostgresSetup::Unavailable(reason)) => {
            eprintln!("Skipping PostgreSQL test (Docker unavailable): {reason}");
            None
        }
        Err(PostgresSetup::Failed(reason)) => panic!("PostgreSQL test store failed: {reason}"),
    }
}

/// Run the same body against SQLite, then PostgreSQL when available.
#[allow(dead_code)]
pub async fn run_metadata_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn MetadataStore>) -> Fut,
    Fut: Future<Output = ()>,
{
    let sqlite = TestMetadata::new().await.expect("sqlite test store");
    test_fn(sqlite.store()).await;

    if let Some(postgres) = postgres_or_skip().await {
        test_fn(postgres.store()).await;
    }
}
