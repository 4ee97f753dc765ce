use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    secret: String,
}

impl ApiClient {
    pub fn new(base_url: &str, secret: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            secret: secret.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.bearer_auth(&self.secret).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let response = req.bearer_auth(&self.secret).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/v1/health")?;
        let response = self.http.get(url).send().await.context("health request failed")?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("health check failed ({status}): {body}");
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn whoami(&self) -> Result<WhoamiResponse> {
        let url = self.url("/v1/auth/whoami")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn trigger_job(&self, req: TriggerJobRequest) -> Result<TriggerJobResponse> {
        let url = self.url("/v1/admin/jobs")?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn list_jobs(
        &self,
        job_type: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<JobResponse>> {
        let mut url = self.url("/v1/admin/jobs")?;
        if let Some(job_type) = job_type {
            url.query_pairs_mut().append_pair("job_type", job_type);
        }
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn get_job(&self, id: &str) -> Result<JobResponse> {
        let url = self.url(&format!("/v1/admin/jobs/{id}"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_certificates(
        &self,
        query: &CertificateQuery,
    ) -> Result<Vec<CertificateResponse>> {
        let mut url = self.url("/v1/certificates")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(kind) = &query.kind {
                pairs.append_pair("kind", kind);
            }
            if let Some(environment) = &query.environment {
                pairs.append_pair("environment", environment);
            }
            if let Some(server) = &query.server {
                pairs.append_pair("server", server);
            }
            if let Some(days) = query.expiring_within_days {
                pairs.append_pair("expiring_within_days", &days.to_string());
            }
            if query.invalid {
                pairs.append_pair("invalid", "true");
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn certificate_stats(&self) -> Result<CertificateStats> {
        let url = self.url("/v1/certificates/stats")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn get_certificate(&self, id: &str) -> Result<CertificateResponse> {
        let url = self.url(&format!("/v1/certificates/{id}"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn certificate_notifications(&self, id: &str) -> Result<Vec<NotificationResponse>> {
        let url = self.url(&format!("/v1/certificates/{id}/notifications"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn current_duty(&self) -> Result<CurrentDutyResponse> {
        let url = self.url("/v1/duty/current")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_duties(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<DutyResponse>> {
        let mut url = self.url("/v1/duty")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(from) = from {
                pairs.append_pair("from", from);
            }
            if let Some(to) = to {
                pairs.append_pair("to", to);
            }
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_announcements(
        &self,
        status: Option<&str>,
        kind: Option<&str>,
    ) -> Result<Vec<AnnouncementResponse>> {
        let mut url = self.url("/v1/announcements")?;
        if let Some(status) = status {
            url.query_pairs_mut().append_pair("status", status);
        }
        if let Some(kind) = kind {
            url.query_pairs_mut().append_pair("kind", kind);
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn change_announcement_status(
        &self,
        id: &str,
        status: &str,
    ) -> Result<AnnouncementResponse> {
        let url = self.url(&format!("/v1/announcements/{id}/status"))?;
        self.send_json(
            self.http
                .post(url)
                .json(&serde_json::json!({ "status": status })),
        )
        .await
    }

    pub async fn create_session(&self, req: CreateSessionRequest) -> Result<CreateSessionResponse> {
        let url = self.url("/v1/admin/sessions")?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let url = self.url("/v1/admin/sessions")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn revoke_session(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/v1/admin/sessions/{id}"))?;
        self.send_empty(self.http.delete(url)).await
    }
}

// =============================================================================
// Request/response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct WhoamiResponse {
    pub session_id: String,
    pub username: String,
    pub scopes: Vec<String>,
    pub auth_method: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct TriggerJobRequest {
    pub job_type: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerJobResponse {
    pub job_id: String,
    pub job_type: String,
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub job_type: String,
    pub triggered_by: String,
    pub state: String,
    pub dry_run: bool,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub stats: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl JobResponse {
    pub fn is_done(&self) -> bool {
        self.state == "finished" || self.state == "failed"
    }
}

#[derive(Debug, Default)]
pub struct CertificateQuery {
    pub kind: Option<String>,
    pub environment: Option<String>,
    pub server: Option<String>,
    pub expiring_within_days: Option<u32>,
    pub invalid: bool,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CertificateResponse {
    pub certificate_id: String,
    pub kind: String,
    pub common_name: String,
    pub serial_number: Option<String>,
    pub alias: Option<String>,
    pub server_hostname: Option<String>,
    pub environment: Option<String>,
    pub keystore_path: Option<String>,
    pub valid_to: Option<String>,
    pub days_until_expiry: Option<i64>,
    pub expiry_error: Option<String>,
    pub source: String,
    pub last_synced_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct KindStats {
    pub total: u64,
    pub expired: u64,
    pub expiring_30: u64,
    pub invalid: u64,
}

#[derive(Debug, Deserialize)]
pub struct CertificateStats {
    pub total: KindStats,
    #[serde(default)]
    pub by_kind: std::collections::BTreeMap<String, KindStats>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationResponse {
    pub notification_id: String,
    pub tier: String,
    pub cycle_key: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub state: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub sent_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DutyResponse {
    pub date: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub days_until: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentDutyResponse {
    pub date: String,
    pub current: Option<DutyResponse>,
    pub next: Option<DutyResponse>,
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementResponse {
    pub announcement_id: String,
    pub title: String,
    pub slug: String,
    pub kind: String,
    pub priority: String,
    pub status: String,
    pub pinned: bool,
    pub published_at: Option<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionRequest {
    pub username: String,
    pub scopes: Vec<String>,
    pub expires_in_secs: Option<u64>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub session_secret: String,
    pub csrf_token: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub username: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub last_seen_at: Option<String>,
    pub description: Option<String>,
}
