//! Server test utilities.

use super::fixtures::{ADMIN_SECRET, FakeDutySource, FakeSource};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use portall_core::config::{AppConfig, MetadataConfig};
use portall_metadata::models::JobRow;
use portall_metadata::repos::JobRepo;
use portall_metadata::{MetadataStore, SqliteStore};
use portall_notify::MemoryMailer;
use portall_server::bootstrap::ensure_admin_session;
use portall_server::{AppState, create_router};
use portall_sources::CertificateSource;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Server with no certificate sources and default test config.
    pub async fn new() -> Self {
        Self::build(Vec::new(), |_| {}).await
    }

    /// Server syncing from the given sources.
    pub async fn with_sources(sources: Vec<Arc<FakeSource>>) -> Self {
        Self::build(sources, |_| {}).await
    }

    /// Server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(Vec::new(), modifier).await
    }

    pub async fn build<F>(sources: Vec<Arc<FakeSource>>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("portall.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.metadata = MetadataConfig::Sqlite { path: db_path };
        modifier(&mut config);

        ensure_admin_session(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to bootstrap admin session");

        let mailer = Arc::new(MemoryMailer::new());
        let sources: Vec<Arc<dyn CertificateSource>> = sources
            .into_iter()
            .map(|s| s as Arc<dyn CertificateSource>)
            .collect();
        let state = AppState::new(config, metadata, sources, mailer.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            mailer,
            _temp_dir: temp_dir,
        }
    }

    /// Attach a roster feed for the duty jobs.
    pub fn with_duty_source(mut self, source: Arc<FakeDutySource>) -> Self {
        self.state = self.state.with_duty_source(source);
        self.router = create_router(self.state.clone());
        self
    }

    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// JSON request authenticated with a bearer secret.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(secret) = bearer {
            builder = builder.header("Authorization", format!("Bearer {secret}"));
        }
        self.send(builder, body).await
    }

    /// JSON request as the bootstrap admin.
    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, body, Some(ADMIN_SECRET)).await
    }

    /// JSON request authenticated with the session cookie and an optional
    /// CSRF header.
    pub async fn cookie_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        secret: &str,
        csrf: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Cookie", format!("theme=dark; portall_session={secret}"));
        if let Some(token) = csrf {
            builder = builder.header("X-CSRF-Token", token);
        }
        self.send(builder, body).await
    }

    async fn send(
        &self,
        mut builder: axum::http::request::Builder,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Issue a session through the API and return `(secret, csrf_token)`.
    pub async fn create_session(&self, username: &str, scopes: &[&str]) -> (String, String) {
        let (status, body) = self
            .admin(
                "POST",
                "/v1/admin/sessions",
                Some(serde_json::json!({ "username": username, "scopes": scopes })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "session create failed: {body}");
        (
            body["session_secret"].as_str().unwrap().to_string(),
            body["csrf_token"].as_str().unwrap().to_string(),
        )
    }

    /// Poll until a job reaches `finished` or `failed`.
    pub async fn wait_for_job(&self, job_id: &str) -> JobRow {
        let job_id = Uuid::parse_str(job_id).unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let row = self
                .state
                .metadata
                .get_job(job_id)
                .await
                .unwrap()
                .expect("job not found");
            if row.state == "finished" || row.state == "failed" {
                return row;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("job {job_id} did not finish in time (state={})", row.state);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Trigger a job as admin and wait for it.
    pub async fn run_job(&self, body: Value) -> (JobRow, Value) {
        let (status, response) = self.admin("POST", "/v1/admin/jobs", Some(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED, "job trigger failed: {response}");
        let row = self
            .wait_for_job(response["job_id"].as_str().unwrap())
            .await;
        let stats = row
            .stats_json
            .as_deref()
            .map(|s| serde_json::from_str(s).unwrap())
            .unwrap_or(Value::Null);
        (row, stats)
    }
}
