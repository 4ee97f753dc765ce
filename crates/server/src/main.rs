//! Portall server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use portall_core::config::AppConfig;
use portall_metadata::MetadataStore;
use portall_server::bootstrap::ensure_admin_session;
use portall_server::jobs::recover_orphaned_jobs;
use portall_server::scheduler::spawn_scheduler;
use portall_server::{AppState, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Portall - operations portal backend
#[derive(Parser, Debug)]
#[command(name = "portalld")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PORTALL_CONFIG",
        default_value = "config/portall.toml"
    )]
    config: String,
}

/// Load configuration from the optional TOML file and `PORTALL_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("PORTALL_") && key != "PORTALL_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: portalld --config /path/to/portall.toml\n  \
             2. Environment variables: PORTALL_SERVER__BIND=0.0.0.0:8080 \
             PORTALL_ADMIN__SESSION_HASH=sha256:YOUR_HASH_HERE portalld\n\n\
             See config/portall.example.toml for example configuration."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("PORTALL_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Portall v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    portall_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = portall_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    ensure_admin_session(metadata.as_ref(), &config.admin).await?;

    let recovered = recover_orphaned_jobs(metadata.as_ref())
        .await
        .context("failed to recover orphaned jobs")?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "Orphaned jobs from previous instance marked failed");
    }

    let sources = portall_sources::from_config(&config.sources)
        .context("failed to configure certificate sources")?;
    tracing::info!(
        sources = ?sources.iter().map(|s| s.source().as_str()).collect::<Vec<_>>(),
        "Certificate sources configured"
    );

    let mailer = portall_notify::from_config(&config.mail).context("failed to configure mail")?;

    let duty_source = match &config.duty.source {
        Some(feed) => {
            let source = portall_sources::HttpDutySource::new(feed.clone())
                .context("failed to configure duty roster feed")?;
            tracing::info!(url = %feed.url, format = feed.format.as_str(), "Duty roster feed configured");
            Some(Arc::new(source) as Arc<dyn portall_sources::DutyRosterSource>)
        }
        None => None,
    };

    let bind = config.server.bind.clone();
    let mut state = AppState::new(config, metadata, sources, mailer);
    if let Some(source) = duty_source {
        state = state.with_duty_source(source);
    }

    let _watchdog_handle = state.job_registry.clone().spawn_watchdog();
    tracing::info!("Job task watchdog spawned");

    let _scheduler_handle = spawn_scheduler(state.clone());

    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
