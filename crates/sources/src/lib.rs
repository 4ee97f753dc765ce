//! Certificate source connectors for Portall.
//!
//! Each connector pulls raw certificate rows from one upstream system:
//! - `sql`: a SELECT against an inventory database
//! - `api`: the vendor certificate-management REST API
//! - `ssh`: keytool / GSKit output read from remote keystores
//!
//! Connectors only fetch. Normalization and upserts belong to the sync job.
//! The `duty` module fetches the on-call roster the same way.

pub mod api;
pub mod duty;
pub mod error;
pub mod keystore;
pub mod sql;
pub mod ssh;

pub use api::ApiSource;
pub use duty::{DutyBatch, DutyRosterSource, HttpDutySource, parse_roster};
pub use error::{SourceError, SourceResult};
pub use sql::SqlSource;
pub use ssh::{OpenSsh, RemoteShell, SshSource, SshTarget};

use async_trait::async_trait;
use portall_core::config::SourcesConfig;
use portall_core::{RawCertificate, SyncSource};
use std::sync::Arc;

/// Rows fetched from one source in one run.
#[derive(Debug, Default)]
pub struct SourceBatch {
    /// Rows that decoded into the raw certificate shape.
    pub rows: Vec<RawCertificate>,
    /// Rows skipped because they could not be decoded.
    pub malformed: u64,
    /// Partial failures (one host or keystore) that did not stop the source.
    pub warnings: Vec<String>,
}

/// A system certificates are synchronized from.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Which source this is, recorded on every certificate it reports.
    fn source(&self) -> SyncSource;

    /// Fetch every certificate the source currently reports.
    async fn fetch(&self) -> SourceResult<SourceBatch>;
}

/// Build the configured connectors, in `sql`, `api`, `ssh` order.
pub fn from_config(config: &SourcesConfig) -> SourceResult<Vec<Arc<dyn CertificateSource>>> {
    let mut sources: Vec<Arc<dyn CertificateSource>> = Vec::new();
    if let Some(sql) = &config.sql {
        sources.push(Arc::new(SqlSource::new(sql.clone())));
    }
    if let Some(api) = &config.api {
        sources.push(Arc::new(ApiSource::new(api.clone())?));
    }
    if let Some(ssh) = &config.ssh {
        sources.push(Arc::new(SshSource::new(
            ssh.clone(),
            Arc::new(OpenSsh::from_config(ssh)),
        )));
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portall_core::config::{ApiSourceConfig, SecretRef, SqlSourceConfig};

    #[test]
    fn test_from_config_builds_configured_sources_only() {
        let config = SourcesConfig {
            sql: Some(SqlSourceConfig {
                url: SecretRef::inline("sqlite::memory:"),
                query: "SELECT 1".to_string(),
                kind: Default::default(),
                timeout_secs: 5,
            }),
            api: Some(ApiSourceConfig {
                base_url: "https://certs.example.com/api".to_string(),
                path: "/certificates".to_string(),
                api_key: SecretRef::env("CERT_API_KEY"),
                api_key_header: "X-API-Key".to_string(),
                timeout_secs: 5,
                max_pages: 3,
            }),
            ..Default::default()
        };

        let sources = from_config(&config).unwrap();
        let kinds: Vec<SyncSource> = sources.iter().map(|s| s.source()).collect();
        assert_eq!(kinds, vec![SyncSource::Sql, SyncSource::Api]);
    }

    #[test]
    fn test_from_config_empty() {
        assert!(from_config(&SourcesConfig::default()).unwrap().is_empty());
    }
}
