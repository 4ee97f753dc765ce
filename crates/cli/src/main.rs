//! Administrative CLI for Portall.

mod api_client;

use anyhow::{Context, Result};
use api_client::{
    ApiClient, CertificateQuery, CertificateResponse, CertificateStats, CreateSessionRequest,
    DutyResponse, JobResponse, TriggerJobRequest,
};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "portallctl")]
#[command(about = "Administrative CLI for Portall")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ClientConfigArgs {
    /// Client config file path
    #[arg(long, env = "PORTALLCTL_CONFIG")]
    client_config: Option<String>,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server API URL (overrides client config)
    #[arg(long)]
    server: Option<String>,

    /// Session secret (overrides client config)
    #[arg(long)]
    secret: Option<String>,

    /// Profile to use from client config (default: default_profile)
    #[arg(long)]
    profile: Option<String>,

    #[command(flatten)]
    client: ClientConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to a server and save credentials locally
    Login {
        /// Local alias for the server
        alias: String,
        /// Server API base URL (e.g., https://portal.example.com)
        url: String,
        /// Session secret (avoid if possible; prefer --secret-stdin)
        #[arg(long)]
        secret: Option<String>,
        /// Read the session secret from stdin
        #[arg(long, default_value_t = false)]
        secret_stdin: bool,
        /// Make this profile the default
        #[arg(long, default_value_t = false)]
        set_default: bool,
        #[command(flatten)]
        client: ClientConfigArgs,
    },
    /// Select the default profile
    Use {
        /// Profile alias to select
        alias: String,
        #[command(flatten)]
        client: ClientConfigArgs,
    },
    /// Check server health and version
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show the current session identity
    Whoami {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Background job commands
    Job {
        #[command(subcommand)]
        command: JobCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Certificate inventory commands
    Cert {
        #[command(subcommand)]
        command: CertCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// On-call roster commands
    Duty {
        #[command(subcommand)]
        command: DutyCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Announcement commands
    Announcement {
        #[command(subcommand)]
        command: AnnouncementCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Session management commands
    Session {
        #[command(subcommand)]
        command: SessionCommands,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Generate an admin secret and the hash for `admin.session_hash`
    GenerateAdminSecret,
}

#[derive(Subcommand)]
enum JobCommands {
    /// Trigger a job
    Trigger {
        /// certificate_sync, certificate_alerts, announcement_archive, weekly_report,
        /// duty_sync or duty_notification
        job_type: String,
        /// Compute and report without writing or sending mail
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Ignore the minimum sync interval
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Sync only: environment filter
        #[arg(long)]
        environment: Option<String>,
        /// Sync only: hostname substring filter
        #[arg(long)]
        host: Option<String>,
        /// Wait for the job to finish and print its stats
        #[arg(long, default_value_t = false)]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    /// List recent jobs
    List {
        #[arg(long)]
        job_type: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one job
    Get {
        /// Job ID
        id: String,
    },
}

#[derive(Subcommand)]
enum CertCommands {
    /// List certificates ordered by expiry
    List {
        /// kdb or java
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        environment: Option<String>,
        /// Hostname substring
        #[arg(long)]
        host: Option<String>,
        /// Only certificates expiring within this many days
        #[arg(long)]
        expiring_within: Option<u32>,
        /// Only certificates without a usable expiry
        #[arg(long, default_value_t = false)]
        invalid: bool,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Expiry counters
    Stats,
    /// Show one certificate and its alert history
    Show {
        /// Certificate ID
        id: String,
    },
}

#[derive(Subcommand)]
enum DutyCommands {
    /// Who is on duty today, and who is next
    Current,
    /// List the roster
    List {
        /// First day, YYYY-MM-DD (default today)
        #[arg(long)]
        from: Option<String>,
        /// Last day, YYYY-MM-DD (default 30 days after --from)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand)]
enum AnnouncementCommands {
    /// List announcements
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        kind: Option<String>,
    },
    /// Publish an announcement
    Publish {
        /// Announcement ID
        id: String,
    },
    /// Archive an announcement
    Archive {
        /// Announcement ID
        id: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Issue a session
    Create {
        /// Username recorded on the session
        username: String,
        /// Comma-separated scopes (portal:read, content:write, certificates:manage, portal:admin)
        #[arg(long, value_delimiter = ',', required = true)]
        scopes: Vec<String>,
        /// Lifetime in seconds (default: server setting)
        #[arg(long)]
        expires_in_secs: Option<u64>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List sessions
    List,
    /// Revoke a session
    Revoke {
        /// Session ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Login {
            alias,
            url,
            secret,
            secret_stdin,
            set_default,
            client,
        } => handle_login_command(&alias, &url, secret, secret_stdin, set_default, &client).await,
        Commands::Use { alias, client } => handle_use_command(&alias, &client).await,
        Commands::Health { api } => handle_health_command(&api).await,
        Commands::Whoami { api } => handle_whoami_command(&api).await,
        Commands::Job { command, api } => handle_job_command(command, &api).await,
        Commands::Cert { command, api } => handle_cert_command(command, &api).await,
        Commands::Duty { command, api } => handle_duty_command(command, &api).await,
        Commands::Announcement { command, api } => {
            handle_announcement_command(command, &api).await
        }
        Commands::Session { command, api } => handle_session_command(command, &api).await,
        Commands::GenerateAdminSecret => {
            let secret = generate_secret();
            println!("Admin secret (store it safely, it is shown once):");
            println!("  {secret}");
            println!();
            println!("Add this to the server configuration:");
            println!("  [admin]");
            println!("  session_hash = \"sha256:{}\"", hash_secret(&secret));
            Ok(())
        }
    }
}

async fn resolve_api_config(api: &ApiArgs) -> Result<(String, String)> {
    match (&api.server, &api.secret) {
        (Some(server), Some(secret)) => return Ok((server.clone(), secret.clone())),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired flag: use both --server and --secret");
        }
        (None, None) => {}
    }

    let server_env = std::env::var("PORTALLCTL_SERVER").ok();
    let secret_env = std::env::var("PORTALLCTL_SECRET").ok();

    match (server_env, secret_env) {
        (Some(server), Some(secret)) => return Ok((server, secret)),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired env var: set both PORTALLCTL_SERVER and PORTALLCTL_SECRET");
        }
        (None, None) => {}
    }

    let config_path = client_config_path(api.client.client_config.as_deref())?;
    let config = load_client_config(&config_path).await?;

    let profile_name = api
        .profile
        .as_ref()
        .or(config.default_profile.as_ref())
        .ok_or_else(|| anyhow::anyhow!("no profile specified and no default_profile set"))?;

    let profile = config
        .profiles
        .get(profile_name)
        .ok_or_else(|| anyhow::anyhow!("profile '{}' not found in client config", profile_name))?;

    Ok((profile.url.clone(), profile.secret.clone()))
}

async fn get_api_client(api: &ApiArgs) -> Result<ApiClient> {
    let (server, secret) = resolve_api_config(api).await?;
    let base_url = normalize_base_url(&server)?;
    ApiClient::new(&base_url, &secret)
}

async fn handle_health_command(api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;
    let health = client.health().await?;

    println!("Status: {}", health.status);
    println!("Server version: {}", health.version);
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));

    if health.version != env!("CARGO_PKG_VERSION") {
        eprintln!(
            "Warning: version mismatch (server: {}, client: {})",
            health.version,
            env!("CARGO_PKG_VERSION")
        );
    }
    Ok(())
}

async fn handle_whoami_command(api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;
    let whoami = client.whoami().await?;

    println!("Session ID: {}", whoami.session_id);
    println!("Username: {}", whoami.username);
    println!("Scopes: {}", whoami.scopes.join(", "));
    println!("Auth: {}", whoami.auth_method);
    match &whoami.expires_at {
        Some(expires_at) => println!("Expires: {expires_at}"),
        None => println!("Expires: never"),
    }
    Ok(())
}

async fn handle_job_command(command: JobCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        JobCommands::Trigger {
            job_type,
            dry_run,
            force,
            environment,
            host,
            wait,
            timeout_secs,
        } => {
            let response = client
                .trigger_job(TriggerJobRequest {
                    job_type,
                    dry_run,
                    force,
                    environment,
                    server: host,
                })
                .await?;
            println!(
                "Job {} queued ({}{})",
                response.job_id,
                response.job_type,
                if response.dry_run { ", dry run" } else { "" }
            );

            if wait {
                let job =
                    wait_for_job(&client, &response.job_id, Duration::from_secs(timeout_secs))
                        .await?;
                print_job(&job);
                if job.state == "failed" {
                    anyhow::bail!("job {} failed", job.job_id);
                }
            }
        }
        JobCommands::List { job_type, limit } => {
            let jobs = client.list_jobs(job_type.as_deref(), limit).await?;
            if jobs.is_empty() {
                println!("No jobs found.");
            }
            for job in &jobs {
                println!(
                    "{}  {:<22} {:<9} {:<8} {}{}",
                    job.job_id,
                    job.job_type,
                    job.state,
                    job.triggered_by,
                    job.started_at.as_deref().unwrap_or("-"),
                    if job.dry_run { "  (dry run)" } else { "" }
                );
            }
        }
        JobCommands::Get { id } => {
            parse_id(&id, "job")?;
            print_job(&client.get_job(&id).await?);
        }
    }
    Ok(())
}

async fn wait_for_job(client: &ApiClient, job_id: &str, timeout: Duration) -> Result<JobResponse> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = client.get_job(job_id).await?;
        if job.is_done() {
            return Ok(job);
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!(
                "timed out waiting for job {job_id} (state: {})",
                job.state
            );
        }
        tokio::time::sleep(JOB_POLL_INTERVAL).await;
    }
}

fn print_job(job: &JobResponse) {
    println!("Job ID: {}", job.job_id);
    println!("Type: {}", job.job_type);
    println!("State: {}", job.state);
    println!("Triggered by: {}", job.triggered_by);
    if job.dry_run {
        println!("Dry run: yes");
    }
    if let Some(started_at) = &job.started_at {
        println!("Started: {started_at}");
    }
    if let Some(finished_at) = &job.finished_at {
        println!("Finished: {finished_at}");
    }
    if let Some(error) = &job.error {
        println!("Error: {error}");
    }
    if let Some(stats) = &job.stats {
        match serde_json::to_string_pretty(stats) {
            Ok(pretty) => println!("Stats:\n{pretty}"),
            Err(_) => println!("Stats: {stats}"),
        }
    }
}

async fn handle_cert_command(command: CertCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        CertCommands::List {
            kind,
            environment,
            host,
            expiring_within,
            invalid,
            limit,
        } => {
            let certs = client
                .list_certificates(&CertificateQuery {
                    kind,
                    environment,
                    server: host,
                    expiring_within_days: expiring_within,
                    invalid,
                    limit,
                })
                .await?;
            if certs.is_empty() {
                println!("No certificates found.");
            }
            for cert in &certs {
                println!("{}", certificate_line(cert));
            }
        }
        CertCommands::Stats => {
            let stats = client.certificate_stats().await?;
            render_stats(&stats);
        }
        CertCommands::Show { id } => {
            parse_id(&id, "certificate")?;
            let cert = client.get_certificate(&id).await?;
            println!("Certificate ID: {}", cert.certificate_id);
            println!("Common name: {}", cert.common_name);
            println!("Kind: {}", cert.kind);
            if let Some(serial) = &cert.serial_number {
                println!("Serial: {serial}");
            }
            if let Some(alias) = &cert.alias {
                println!("Alias: {alias}");
            }
            println!("Host: {}", cert.server_hostname.as_deref().unwrap_or("-"));
            println!("Environment: {}", cert.environment.as_deref().unwrap_or("-"));
            if let Some(path) = &cert.keystore_path {
                println!("Keystore: {path}");
            }
            println!("Expires: {}", expiry_label(&cert));
            println!("Source: {} (last synced {})", cert.source, cert.last_synced_at);

            let notifications = client.certificate_notifications(&id).await?;
            if !notifications.is_empty() {
                println!("\nAlerts:");
                for n in &notifications {
                    println!(
                        "  {}  {:<8} {:<7} {}",
                        n.created_at,
                        n.tier,
                        n.state,
                        n.recipients.join(", ")
                    );
                    if let Some(error) = &n.error_message {
                        println!("      error: {error}");
                    }
                }
            }
        }
    }
    Ok(())
}

fn expiry_label(cert: &CertificateResponse) -> String {
    match (&cert.valid_to, cert.days_until_expiry) {
        (Some(valid_to), Some(days)) if days < 0 => format!("{valid_to} (expired {} days ago)", -days),
        (Some(valid_to), Some(days)) => format!("{valid_to} ({days} days)"),
        _ => format!(
            "invalid ({})",
            cert.expiry_error.as_deref().unwrap_or("no expiry")
        ),
    }
}

fn certificate_line(cert: &CertificateResponse) -> String {
    let days = cert
        .days_until_expiry
        .map(|d| d.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{:>5}d  {:<4} {:<40} {:<30} {}",
        days,
        cert.kind,
        cert.common_name,
        cert.server_hostname.as_deref().unwrap_or("-"),
        cert.environment.as_deref().unwrap_or("-")
    )
}

fn render_stats(stats: &CertificateStats) {
    println!("Certificates: {}", stats.total.total);
    println!("  Expired:           {}", stats.total.expired);
    println!("  Expiring in 30d:   {}", stats.total.expiring_30);
    println!("  Invalid expiry:    {}", stats.total.invalid);
    for (kind, counts) in &stats.by_kind {
        println!(
            "  {kind}: {} total, {} expired, {} expiring, {} invalid",
            counts.total, counts.expired, counts.expiring_30, counts.invalid
        );
    }
}

async fn handle_duty_command(command: DutyCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        DutyCommands::Current => {
            let duty = client.current_duty().await?;
            println!("Today ({}):", duty.date);
            match &duty.current {
                Some(current) => print_duty_contact(current),
                None => println!("  nobody on the roster"),
            }
            if let Some(next) = &duty.next {
                println!("Next: {}", duty_line(next));
                print_duty_contact(next);
            }
        }
        DutyCommands::List { from, to } => {
            let duties = client.list_duties(from.as_deref(), to.as_deref()).await?;
            if duties.is_empty() {
                println!("No duties found.");
            }
            for d in &duties {
                println!("{}", duty_line(d));
            }
        }
    }
    Ok(())
}

fn duty_line(duty: &DutyResponse) -> String {
    let when = match duty.days_until {
        Some(0) => "today".to_string(),
        Some(days) => format!("in {days}d"),
        None => "past".to_string(),
    };
    format!(
        "{}  {:<7} {:<30} {}",
        duty.date,
        when,
        duty.name,
        duty.phone.as_deref().unwrap_or("-")
    )
}

fn print_duty_contact(duty: &DutyResponse) {
    println!("  {}", duty.name);
    for (label, value) in [
        ("Phone", &duty.phone),
        ("Email", &duty.email),
        ("Notes", &duty.notes),
    ] {
        if let Some(value) = value {
            println!("  {label}: {value}");
        }
    }
}

async fn handle_announcement_command(command: AnnouncementCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    let (id, status) = match command {
        AnnouncementCommands::List { status, kind } => {
            let announcements = client
                .list_announcements(status.as_deref(), kind.as_deref())
                .await?;
            if announcements.is_empty() {
                println!("No announcements found.");
            }
            for a in &announcements {
                println!(
                    "{}  {:<9} {:<12} {:<8} {}{}",
                    a.announcement_id,
                    a.status,
                    a.kind,
                    a.priority,
                    a.title,
                    if a.pinned { " [pinned]" } else { "" }
                );
            }
            return Ok(());
        }
        AnnouncementCommands::Publish { id } => (id, "published"),
        AnnouncementCommands::Archive { id } => (id, "archived"),
    };

    parse_id(&id, "announcement")?;
    let updated = client.change_announcement_status(&id, status).await?;
    println!("{} is now {}", updated.slug, updated.status);
    if let Some(published_at) = &updated.published_at {
        println!("Published: {published_at}");
    }
    Ok(())
}

async fn handle_session_command(command: SessionCommands, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;

    match command {
        SessionCommands::Create {
            username,
            scopes,
            expires_in_secs,
            description,
        } => {
            let response = client
                .create_session(CreateSessionRequest {
                    username,
                    scopes,
                    expires_in_secs,
                    description,
                })
                .await?;
            println!("Session ID: {}", response.session_id);
            println!("Secret: {}", response.session_secret);
            println!("CSRF token: {}", response.csrf_token);
            println!(
                "Expires: {}",
                response.expires_at.as_deref().unwrap_or("never")
            );
            eprintln!("The secret is shown once; store it now.");
        }
        SessionCommands::List => {
            let sessions = client.list_sessions().await?;
            for s in &sessions {
                let state = if s.revoked_at.is_some() {
                    "revoked"
                } else {
                    "active"
                };
                println!(
                    "{}  {:<16} {:<8} {}  expires {}",
                    s.session_id,
                    s.username,
                    state,
                    s.scopes.join(","),
                    s.expires_at.as_deref().unwrap_or("never")
                );
            }
        }
        SessionCommands::Revoke { id } => {
            parse_id(&id, "session")?;
            client.revoke_session(&id).await?;
            println!("Session {id} revoked");
        }
    }
    Ok(())
}

fn parse_id(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("invalid {what} id: {id}"))
}

// =============================================================================
// Client profiles
// =============================================================================

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
#[serde(default)]
struct ClientConfig {
    default_profile: Option<String>,
    profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
struct Profile {
    url: String,
    secret: String,
    username: Option<String>,
}

async fn handle_login_command(
    alias: &str,
    url: &str,
    secret: Option<String>,
    secret_stdin: bool,
    set_default: bool,
    client: &ClientConfigArgs,
) -> Result<()> {
    let secret = read_secret(secret, secret_stdin)?;
    let base_url = normalize_base_url(url)?;
    let config_path = client_config_path(client.client_config.as_deref())?;

    let api = ApiClient::new(&base_url, &secret)?;
    let whoami = api.whoami().await.context("login failed")?;

    let mut config = load_client_config(&config_path).await?;
    config.profiles.insert(
        alias.to_string(),
        Profile {
            url: base_url.clone(),
            secret,
            username: Some(whoami.username.clone()),
        },
    );
    if set_default || config.default_profile.is_none() {
        config.default_profile = Some(alias.to_string());
    }

    save_client_config(&config_path, &config).await?;

    println!("Logged in as '{}' ({alias})", whoami.username);
    println!("  URL: {base_url}");
    println!("  Scopes: {}", whoami.scopes.join(", "));
    if whoami.expires_at.is_some() {
        eprintln!("Note: this session expires; log in again when it does.");
    }
    println!("Client config: {}", config_path.display());

    Ok(())
}

async fn handle_use_command(alias: &str, client: &ClientConfigArgs) -> Result<()> {
    let config_path = client_config_path(client.client_config.as_deref())?;
    let mut config = load_client_config(&config_path).await?;

    if !config.profiles.contains_key(alias) {
        anyhow::bail!("unknown profile: {alias}");
    }
    config.default_profile = Some(alias.to_string());
    save_client_config(&config_path, &config).await?;

    println!("Selected profile: {alias}");
    Ok(())
}

fn client_config_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    let base = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config directory found; set PORTALLCTL_CONFIG"))?;
    Ok(base.join("portall").join("client.toml"))
}

async fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("PORTALLCTL_").split("__"));

    match figment.extract() {
        Ok(config) => Ok(config),
        Err(_) if !path.exists() => Ok(ClientConfig::default()),
        Err(err) => Err(anyhow::anyhow!(err).context("failed to load client configuration")),
    }
}

async fn save_client_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string_pretty(config)?;

    tokio::fs::write(path, contents).await?;

    // Secrets live in this file.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

fn read_secret(secret: Option<String>, secret_stdin: bool) -> Result<String> {
    if let Some(secret) = secret {
        return Ok(secret);
    }
    if secret_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        let secret = buf.trim().to_string();
        if secret.is_empty() {
            anyhow::bail!("secret read from stdin is empty");
        }
        return Ok(secret);
    }
    anyhow::bail!("secret required: use --secret or --secret-stdin");
}

fn normalize_base_url(url: &str) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("server URL must start with http:// or https://");
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// 32 random bytes, URL-safe base64.
fn generate_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a secret the way the server stores it.
fn hash_secret(secret: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(secret.as_bytes()))
}
