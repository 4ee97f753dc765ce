//! Configuration types shared across crates.

use crate::alert::{AlertThresholds, DEFAULT_THRESHOLDS, DedupWindow};
use crate::certificate::CertificateKind;
use crate::duty::DutyFormat;
use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum JSON request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Lifetime of sessions created through the admin API, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Mark the session cookie `Secure` (requires HTTPS in front of the server).
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// Restrict access to it at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_session_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_secure_cookies() -> bool {
    true
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            session_ttl_secs: default_session_ttl_secs(),
            secure_cookies: default_secure_cookies(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Get the session lifetime as a Duration.
    pub fn session_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Validate server configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be greater than 0".to_string());
        }
        if self.session_ttl_secs == 0 {
            return Err("server.session_ttl_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Bootstrap admin session configuration.
///
/// The admin session is required for server operation. It provides initial
/// access to create sessions for other users and trigger jobs. If the hash
/// changes between restarts, the previous admin session is revoked and a new
/// one is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin secret (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret" | sha256sum`
    pub session_hash: String,
    /// Username recorded on the admin session.
    #[serde(default = "default_admin_username")]
    pub username: String,
    /// Scopes for the admin session (default: ["portal:admin"]).
    pub scopes: Option<Vec<String>>,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

impl AdminConfig {
    /// Create a test configuration with a dummy hash.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-secret"
            session_hash: "b0413b34669b4c59b09c34129667cfbb4ce47a9bbf49785b5a8ae2d7858bea24"
                .to_string(),
            username: default_admin_username(),
            scopes: None,
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// Prefer PORTALL_METADATA__PASSWORD over storing it in the file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/portall.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields"
                        .to_string(),
                ),
            },
        }
    }
}

/// A secret given inline or by environment variable name.
///
/// Resolution happens when a job runs, so a missing variable halts only the
/// job that needs it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretRef {
    /// Inline value (not recommended outside development).
    pub value: Option<String>,
    /// Environment variable holding the value.
    pub env: Option<String>,
}

impl SecretRef {
    /// Reference an environment variable.
    pub fn env(var: &str) -> Self {
        Self {
            value: None,
            env: Some(var.to_string()),
        }
    }

    /// Inline value.
    pub fn inline(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            env: None,
        }
    }

    /// Resolve to a value. Inline values take precedence.
    pub fn resolve(&self) -> Option<String> {
        if let Some(value) = self.value.as_ref().filter(|v| !v.is_empty()) {
            return Some(value.clone());
        }
        self.env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
    }

    /// Whether anything was configured at all.
    pub fn is_configured(&self) -> bool {
        self.value.is_some() || self.env.is_some()
    }

    /// Description safe for logs (never the value).
    pub fn describe(&self) -> String {
        match (&self.value, &self.env) {
            (Some(_), _) => "inline value".to_string(),
            (None, Some(var)) => format!("env var {var}"),
            (None, None) => "nothing".to_string(),
        }
    }
}

/// SQL inventory source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqlSourceConfig {
    /// Database URL (`postgres://...` or `sqlite:...`).
    #[serde(default)]
    pub url: SecretRef,
    /// Query returning one row per certificate.
    #[serde(default = "default_sql_query")]
    pub query: String,
    /// Kind of certificates this query returns.
    #[serde(default)]
    pub kind: CertificateKind,
    /// Connect and query timeout in seconds.
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_sql_query() -> String {
    "SELECT serial_number, common_name, subject, issuer, valid_from, valid_to, \
     server_hostname, application_name, environment, kdb_file_path, kdb_label, external_id \
     FROM certificates"
        .to_string()
}

fn default_source_timeout_secs() -> u64 {
    30
}

/// Vendor certificate-management API source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiSourceConfig {
    /// Base URL (e.g., "https://appviewx.example.com/api").
    pub base_url: String,
    /// Path of the listing endpoint.
    #[serde(default = "default_api_path")]
    pub path: String,
    /// API key.
    #[serde(default)]
    pub api_key: SecretRef,
    /// Header carrying the API key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Request timeout in seconds.
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum pages followed through `next` links.
    #[serde(default = "default_api_max_pages")]
    pub max_pages: u32,
}

fn default_api_path() -> String {
    "/certificates".to_string()
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_api_max_pages() -> u32 {
    50
}

/// One keystore on a remote host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreConfig {
    /// Absolute path on the remote host.
    pub path: String,
    /// `kdb` uses GSKit, `java` uses keytool.
    #[serde(default = "default_keystore_kind")]
    pub kind: CertificateKind,
    /// Keystore password.
    #[serde(default)]
    pub password: SecretRef,
    /// Keystore type passed to keytool (JKS, PKCS12, JCEKS).
    pub store_type: Option<String>,
    /// Application served by this keystore.
    pub application: Option<String>,
}

fn default_keystore_kind() -> CertificateKind {
    CertificateKind::Java
}

/// One remote host scanned over SSH.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SshHostConfig {
    /// Hostname or address.
    pub hostname: String,
    /// Login user (defaults to `sources.ssh.user`).
    pub user: Option<String>,
    /// SSH port.
    pub port: Option<u16>,
    /// Environment label applied to every certificate from this host.
    pub environment: Option<String>,
    /// Keystores to read.
    #[serde(default)]
    pub keystores: Vec<KeystoreConfig>,
}

/// SSH keystore source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SshSourceConfig {
    /// Hosts to scan.
    #[serde(default)]
    pub hosts: Vec<SshHostConfig>,
    /// Default login user.
    pub user: Option<String>,
    /// Private key passed with `-i`.
    pub identity_file: Option<PathBuf>,
    /// SSH client binary.
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,
    /// Remote keytool binary.
    #[serde(default = "default_keytool")]
    pub keytool: String,
    /// Remote GSKit binary.
    #[serde(default = "default_gsk")]
    pub gsk_command: String,
    /// SSH connect timeout in seconds.
    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-command timeout in seconds.
    #[serde(default = "default_source_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_keytool() -> String {
    "keytool".to_string()
}

fn default_gsk() -> String {
    "gsk8capicmd_64".to_string()
}

fn default_ssh_connect_timeout_secs() -> u64 {
    10
}

/// Certificate source connectors. Unset connectors are skipped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub sql: Option<SqlSourceConfig>,
    pub api: Option<ApiSourceConfig>,
    pub ssh: Option<SshSourceConfig>,
    /// Scheduled syncs are skipped if one finished less than this many seconds
    /// ago. Manual triggers with `force` bypass it.
    #[serde(default = "default_min_sync_interval_secs")]
    pub min_interval_secs: u64,
    /// Only keep certificates whose environment equals this value.
    pub environment_filter: Option<String>,
    /// Only keep certificates whose hostname contains this value.
    pub server_filter: Option<String>,
}

fn default_min_sync_interval_secs() -> u64 {
    3600
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            sql: None,
            api: None,
            ssh: None,
            min_interval_secs: default_min_sync_interval_secs(),
            environment_filter: None,
            server_filter: None,
        }
    }
}

impl SourcesConfig {
    /// Validate connector configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(sql) = &self.sql {
            if !sql.url.is_configured() {
                return Err("sources.sql.url requires 'value' or 'env'".to_string());
            }
            if sql.query.trim().is_empty() {
                return Err("sources.sql.query must not be empty".to_string());
            }
        }
        if let Some(api) = &self.api {
            if !api.base_url.starts_with("http://") && !api.base_url.starts_with("https://") {
                return Err(format!(
                    "sources.api.base_url '{}' must be an http(s) URL",
                    api.base_url
                ));
            }
            if api.max_pages == 0 {
                return Err("sources.api.max_pages must be greater than 0".to_string());
            }
        }
        if let Some(ssh) = &self.ssh {
            for host in &ssh.hosts {
                if host.hostname.trim().is_empty() {
                    return Err("sources.ssh.hosts entries require a hostname".to_string());
                }
                if host.hostname.starts_with('-') {
                    return Err(format!(
                        "sources.ssh host '{}' must not start with '-'",
                        host.hostname
                    ));
                }
                for keystore in &host.keystores {
                    if !keystore.path.starts_with('/') {
                        return Err(format!(
                            "keystore path '{}' on {} must be absolute",
                            keystore.path, host.hostname
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether any connector is configured.
    pub fn any_configured(&self) -> bool {
        self.sql.is_some() || self.api.is_some() || self.ssh.is_some()
    }
}

/// Expiry alert configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Thresholds in days. `expired` is always a tier.
    #[serde(default = "default_thresholds_days")]
    pub thresholds_days: Vec<u32>,
    /// Recipients for every tier.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Per-tier recipient overrides keyed by tier label (e.g. "expired", "7_days").
    #[serde(default)]
    pub tier_recipients: BTreeMap<String, Vec<String>>,
    /// Subject template; `{placeholder}` fields are filled per certificate.
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
    /// Body template.
    #[serde(default = "default_body_template")]
    pub body_template: String,
    /// Deduplication window for repeated runs.
    #[serde(default)]
    pub dedup_window: DedupWindow,
}

fn default_thresholds_days() -> Vec<u32> {
    DEFAULT_THRESHOLDS.to_vec()
}

fn default_subject_template() -> String {
    "[{alert_type}] Certificate {common_name} expires on {valid_to}".to_string()
}

fn default_body_template() -> String {
    "Certificate: {common_name}\n\
     Type: {certificate_type}\n\
     Serial: {serial_number}\n\
     Server: {server_hostname}\n\
     Application: {application_name}\n\
     Environment: {environment}\n\
     Expires: {valid_to} ({days_until_expiry} days)\n"
        .to_string()
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            thresholds_days: default_thresholds_days(),
            recipients: Vec::new(),
            tier_recipients: BTreeMap::new(),
            subject_template: default_subject_template(),
            body_template: default_body_template(),
            dedup_window: DedupWindow::default(),
        }
    }
}

impl AlertsConfig {
    /// Parsed thresholds.
    pub fn thresholds(&self) -> crate::Result<AlertThresholds> {
        AlertThresholds::new(self.thresholds_days.clone())
    }

    /// Recipients for a tier label, falling back to the shared list.
    pub fn recipients_for(&self, tier_label: &str) -> &[String] {
        self.tier_recipients
            .get(tier_label)
            .filter(|list| !list.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&self.recipients)
    }

    /// Validate alert configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.thresholds().map_err(|e| e.to_string())?;
        for label in self.tier_recipients.keys() {
            crate::alert::AlertTier::parse(label).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// Outbound mail transport.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MailTransportConfig {
    /// Log messages instead of sending them.
    #[default]
    Console,
    /// SMTP relay.
    Smtp {
        host: String,
        #[serde(default = "default_smtp_port")]
        port: u16,
        username: Option<String>,
        #[serde(default)]
        password: SecretRef,
        /// Use STARTTLS (default) instead of plaintext.
        #[serde(default = "default_starttls")]
        starttls: bool,
        #[serde(default = "default_smtp_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

fn default_smtp_timeout_secs() -> u64 {
    30
}

/// Mail configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailConfig {
    /// Sender address.
    #[serde(default = "default_mail_from")]
    pub from: String,
    /// Transport.
    #[serde(default)]
    pub transport: MailTransportConfig,
}

fn default_mail_from() -> String {
    "noreply@portall.local".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_mail_from(),
            transport: MailTransportConfig::default(),
        }
    }
}

/// Background job schedules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Master switch for automatic runs. Manual triggers always work.
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,
    /// How often the scheduler checks for due jobs, in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_sync_schedule")]
    pub certificate_sync: Schedule,
    #[serde(default = "default_alerts_schedule")]
    pub certificate_alerts: Schedule,
    #[serde(default = "default_archive_schedule")]
    pub announcement_archive: Schedule,
    #[serde(default = "default_report_schedule")]
    pub weekly_report: Schedule,
    #[serde(default = "default_duty_sync_schedule")]
    pub duty_sync: Schedule,
    #[serde(default = "default_duty_notification_schedule")]
    pub duty_notification: Schedule,
}

fn default_schedule_enabled() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    30
}

fn default_sync_schedule() -> Schedule {
    Schedule::daily("02:00")
}

fn default_alerts_schedule() -> Schedule {
    Schedule::daily("08:00")
}

fn default_archive_schedule() -> Schedule {
    Schedule::Interval {
        every_secs: 6 * 3600,
    }
}

fn default_report_schedule() -> Schedule {
    Schedule::weekly("monday", "09:00")
}

fn default_duty_sync_schedule() -> Schedule {
    Schedule::daily("06:00")
}

fn default_duty_notification_schedule() -> Schedule {
    Schedule::daily("07:30")
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            tick_secs: default_tick_secs(),
            certificate_sync: default_sync_schedule(),
            certificate_alerts: default_alerts_schedule(),
            announcement_archive: default_archive_schedule(),
            weekly_report: default_report_schedule(),
            duty_sync: default_duty_sync_schedule(),
            duty_notification: default_duty_notification_schedule(),
        }
    }
}

impl ScheduleConfig {
    /// Validate every schedule.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_secs == 0 {
            return Err("schedule.tick_secs cannot be 0".to_string());
        }
        for (name, schedule) in [
            ("certificate_sync", &self.certificate_sync),
            ("certificate_alerts", &self.certificate_alerts),
            ("announcement_archive", &self.announcement_archive),
            ("weekly_report", &self.weekly_report),
            ("duty_sync", &self.duty_sync),
            ("duty_notification", &self.duty_notification),
        ] {
            schedule
                .validate()
                .map_err(|e| format!("schedule.{name}: {e}"))?;
        }
        Ok(())
    }

    /// Get the tick interval as a std::time::Duration.
    pub fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_secs)
    }
}

/// Weekly summary report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Recipients; falls back to `alerts.recipients` when empty.
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_report_subject")]
    pub subject: String,
}

fn default_report_subject() -> String {
    "Portall weekly certificate report".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            subject: default_report_subject(),
        }
    }
}

/// Roster feed for the duty sync job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DutySourceConfig {
    /// Feed URL (http or https).
    pub url: String,
    #[serde(default)]
    pub format: DutyFormat,
    /// Bearer token sent as `Authorization`, when the feed needs one.
    #[serde(default)]
    pub token: Option<SecretRef>,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

/// Daily on-call roster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DutyConfig {
    /// Roster feed. Without one, duty sync is not scheduled.
    pub source: Option<DutySourceConfig>,
    /// Recipients of the daily duty notice. Without any, it is not scheduled.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Entries older than this many days are pruned by the sync job.
    #[serde(default = "default_duty_retention_days")]
    pub retention_days: u32,
}

fn default_duty_retention_days() -> u32 {
    180
}

impl Default for DutyConfig {
    fn default() -> Self {
        Self {
            source: None,
            recipients: Vec::new(),
            retention_days: default_duty_retention_days(),
        }
    }
}

impl DutyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(source) = &self.source {
            if !source.url.starts_with("http://") && !source.url.starts_with("https://") {
                return Err("duty.source.url must start with http:// or https://".to_string());
            }
            if source.timeout_secs == 0 {
                return Err("duty.source.timeout_secs cannot be 0".to_string());
            }
            if let Some(token) = &source.token
                && !token.is_configured()
            {
                return Err("duty.source.token requires 'value' or 'env'".to_string());
            }
        }
        if self.retention_days == 0 {
            return Err("duty.retention_days cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin session configuration (required).
    pub admin: AdminConfig,
    /// Certificate source connectors.
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Expiry alerts.
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Outbound mail.
    #[serde(default)]
    pub mail: MailConfig,
    /// Job schedules.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Weekly report.
    #[serde(default)]
    pub report: ReportConfig,
    /// On-call roster.
    #[serde(default)]
    pub duty: DutyConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** SQLite metadata, console mail, no sources and
    /// automatic scheduling disabled.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                secure_cookies: false,
                ..ServerConfig::default()
            },
            metadata: MetadataConfig::default(),
            admin: AdminConfig::for_testing(),
            sources: SourcesConfig::default(),
            alerts: AlertsConfig {
                recipients: vec!["ops@example.com".to_string()],
                ..AlertsConfig::default()
            },
            mail: MailConfig::default(),
            schedule: ScheduleConfig {
                enabled: false,
                ..ScheduleConfig::default()
            },
            report: ReportConfig::default(),
            duty: DutyConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.metadata.validate()?;
        self.sources.validate()?;
        self.alerts.validate()?;
        self.schedule.validate()?;
        self.duty.validate()?;
        Ok(())
    }
}
