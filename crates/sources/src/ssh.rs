//! SSH keystore source.
//!
//! Logs into each configured host and lists its keystores with `keytool`
//! (Java) or `gsk8capicmd` (KDB). A host or keystore that fails becomes a
//! warning on the batch; the source only fails when nothing could be read.

use crate::error::{SourceError, SourceResult};
use crate::keystore::{parse_gsk_details, parse_gsk_labels, parse_keytool_list};
use crate::{CertificateSource, SourceBatch};
use async_trait::async_trait;
use portall_core::config::{KeystoreConfig, SshHostConfig, SshSourceConfig};
use portall_core::{CertificateKind, RawCertificate, SyncSource};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Where a remote command runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshTarget {
    pub hostname: String,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl SshTarget {
    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.hostname),
            None => self.hostname.clone(),
        }
    }
}

/// Runs a command on a remote host and returns its stdout.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run(&self, target: &SshTarget, command: &str, stdin: Option<&str>)
    -> SourceResult<String>;
}

/// [`RemoteShell`] backed by the system OpenSSH client.
///
/// Runs in batch mode, so hosts must accept key authentication.
pub struct OpenSsh {
    binary: String,
    identity_file: Option<PathBuf>,
    connect_timeout_secs: u64,
    command_timeout_secs: u64,
}

impl OpenSsh {
    pub fn from_config(config: &SshSourceConfig) -> Self {
        Self {
            binary: config.ssh_binary.clone(),
            identity_file: config.identity_file.clone(),
            connect_timeout_secs: config.connect_timeout_secs,
            command_timeout_secs: config.command_timeout_secs,
        }
    }

    fn command(&self, target: &SshTarget, remote: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        if let Some(port) = target.port {
            cmd.arg("-p").arg(port.to_string());
        }
        cmd.arg(target.destination()).arg("--").arg(remote);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteShell for OpenSsh {
    async fn run(
        &self,
        target: &SshTarget,
        command: &str,
        stdin: Option<&str>,
    ) -> SourceResult<String> {
        let mut child = self.command(target, command).spawn()?;

        if let Some(mut pipe) = child.stdin.take() {
            if let Some(input) = stdin {
                pipe.write_all(input.as_bytes()).await?;
                pipe.write_all(b"\n").await?;
            }
            drop(pipe);
        }

        let output = tokio::time::timeout(
            Duration::from_secs(self.command_timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| SourceError::Timeout(self.command_timeout_secs))??;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            Some(255) => Err(SourceError::Unreachable(format!(
                "ssh {}: {stderr}",
                target.hostname
            ))),
            code => Err(SourceError::Command(format!(
                "{} exited with {}: {stderr}",
                target.hostname,
                code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            ))),
        }
    }
}

/// Reads keystores on remote hosts through a [`RemoteShell`].
pub struct SshSource {
    config: SshSourceConfig,
    shell: Arc<dyn RemoteShell>,
}

impl SshSource {
    pub fn new(config: SshSourceConfig, shell: Arc<dyn RemoteShell>) -> Self {
        Self { config, shell }
    }

    fn target(&self, host: &SshHostConfig) -> SshTarget {
        SshTarget {
            hostname: host.hostname.clone(),
            user: host.user.clone().or_else(|| self.config.user.clone()),
            port: host.port,
        }
    }

    async fn read_keystore(
        &self,
        target: &SshTarget,
        keystore: &KeystoreConfig,
    ) -> SourceResult<Vec<RawCertificate>> {
        match keystore.kind {
            CertificateKind::Java => self.read_java(target, keystore).await,
            CertificateKind::Kdb => self.read_kdb(target, keystore).await,
        }
    }

    async fn read_java(
        &self,
        target: &SshTarget,
        keystore: &KeystoreConfig,
    ) -> SourceResult<Vec<RawCertificate>> {
        let password = keystore.password.resolve().ok_or_else(|| {
            SourceError::MissingCredential(format!(
                "password for {} ({})",
                keystore.path,
                keystore.password.describe()
            ))
        })?;

        let mut command = format!(
            "{} -list -v -keystore {}",
            self.config.keytool,
            shell_quote(&keystore.path)
        );
        if let Some(store_type) = &keystore.store_type {
            command.push_str(&format!(" -storetype {}", shell_quote(store_type)));
        }

        let output = self.shell.run(target, &command, Some(&password)).await?;
        let certificates = parse_keytool_list(&output);
        if certificates.is_empty() && !output.contains("contains 0 entries") {
            return Err(SourceError::Malformed(format!(
                "no entries parsed from keytool output for {}",
                keystore.path
            )));
        }
        Ok(certificates)
    }

    /// KDB files are opened with their stash file, so no password is sent.
    async fn read_kdb(
        &self,
        target: &SshTarget,
        keystore: &KeystoreConfig,
    ) -> SourceResult<Vec<RawCertificate>> {
        let db = shell_quote(&keystore.path);
        let list = format!("{} -cert -list -db {db} -stashed", self.config.gsk_command);
        let labels = parse_gsk_labels(&self.shell.run(target, &list, None).await?);

        let mut certificates = Vec::with_capacity(labels.len());
        for label in labels {
            let details = format!(
                "{} -cert -details -db {db} -stashed -label {}",
                self.config.gsk_command,
                shell_quote(&label)
            );
            let output = self.shell.run(target, &details, None).await?;
            let mut cert = parse_gsk_details(&output);
            if cert.alias.is_none() {
                cert.alias = Some(label);
            }
            certificates.push(cert);
        }
        Ok(certificates)
    }
}

#[async_trait]
impl CertificateSource for SshSource {
    fn source(&self) -> SyncSource {
        SyncSource::Ssh
    }

    async fn fetch(&self) -> SourceResult<SourceBatch> {
        let mut batch = SourceBatch::default();
        let mut attempted = 0usize;
        let mut last_error = None;

        for host in &self.config.hosts {
            let target = self.target(host);
            for keystore in &host.keystores {
                attempted += 1;
                match self.read_keystore(&target, keystore).await {
                    Ok(certificates) => {
                        tracing::debug!(
                            host = %host.hostname,
                            keystore = %keystore.path,
                            count = certificates.len(),
                            "Read keystore"
                        );
                        for mut cert in certificates {
                            cert.kind = keystore.kind;
                            cert.server_hostname = Some(host.hostname.clone());
                            cert.environment = host.environment.clone();
                            cert.application_name = keystore.application.clone();
                            cert.keystore_path = Some(keystore.path.clone());
                            if let Some(store_type) = &keystore.store_type {
                                cert.keystore_type = Some(store_type.clone());
                            }
                            batch.rows.push(cert);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            host = %host.hostname,
                            keystore = %keystore.path,
                            error = %e,
                            "Failed to read keystore"
                        );
                        batch
                            .warnings
                            .push(format!("{}:{}: {e}", host.hostname, keystore.path));
                        last_error = Some(e);
                    }
                }
            }
        }

        if attempted > 0
            && batch.warnings.len() == attempted
            && let Some(e) = last_error
        {
            return Err(e);
        }
        Ok(batch)
    }
}

/// Quote a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use portall_core::config::SecretRef;
    use std::sync::Mutex;

    const KEYTOOL: &str = "Keystore type: JKS\n\n\
        Alias name: web\n\
        Owner: CN=web.example.com\n\
        Issuer: CN=CA\n\
        Serial number: 1f\n\
        Valid from: Mon Jan 01 00:00:00 UTC 2024 until: Wed Jan 01 00:00:00 UTC 2025\n";

    /// Replays canned output keyed by a substring of the command.
    #[derive(Default)]
    struct FakeShell {
        responses: Vec<(String, String, SourceResult<String>)>,
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl FakeShell {
        fn respond(mut self, host: &str, needle: &str, result: SourceResult<String>) -> Self {
            self.responses
                .push((host.to_string(), needle.to_string(), result));
            self
        }
    }

    #[async_trait]
    impl RemoteShell for FakeShell {
        async fn run(
            &self,
            target: &SshTarget,
            command: &str,
            stdin: Option<&str>,
        ) -> SourceResult<String> {
            self.calls.lock().unwrap().push((
                target.destination(),
                command.to_string(),
                stdin.map(str::to_string),
            ));
            for (host, needle, result) in &self.responses {
                if *host == target.hostname && command.contains(needle.as_str()) {
                    return match result {
                        Ok(out) => Ok(out.clone()),
                        Err(e) => Err(SourceError::Unreachable(e.to_string())),
                    };
                }
            }
            Err(SourceError::Command(format!("unexpected command: {command}")))
        }
    }

    fn java_keystore(path: &str) -> KeystoreConfig {
        KeystoreConfig {
            path: path.to_string(),
            kind: CertificateKind::Java,
            password: SecretRef::inline("changeit"),
            store_type: None,
            application: Some("billing".to_string()),
        }
    }

    fn kdb_keystore(path: &str) -> KeystoreConfig {
        KeystoreConfig {
            path: path.to_string(),
            kind: CertificateKind::Kdb,
            password: SecretRef::default(),
            store_type: None,
            application: None,
        }
    }

    fn config(hosts: Vec<SshHostConfig>) -> SshSourceConfig {
        SshSourceConfig {
            hosts,
            user: Some("scanner".to_string()),
            identity_file: None,
            ssh_binary: "ssh".to_string(),
            keytool: "keytool".to_string(),
            gsk_command: "gsk8capicmd_64".to_string(),
            connect_timeout_secs: 5,
            command_timeout_secs: 5,
        }
    }

    fn host(name: &str, keystores: Vec<KeystoreConfig>) -> SshHostConfig {
        SshHostConfig {
            hostname: name.to_string(),
            user: None,
            port: None,
            environment: Some("prod".to_string()),
            keystores,
        }
    }

    #[tokio::test]
    async fn test_java_keystore_sends_password_on_stdin() {
        let shell = Arc::new(FakeShell::default().respond("app01", "keytool", Ok(KEYTOOL.into())));
        let source = SshSource::new(
            config(vec![host("app01", vec![java_keystore("/opt/app/keystore.jks")])]),
            shell.clone(),
        );

        let batch = source.fetch().await.unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert!(batch.warnings.is_empty());

        let cert = &batch.rows[0];
        assert_eq!(cert.kind, CertificateKind::Java);
        assert_eq!(cert.server_hostname.as_deref(), Some("app01"));
        assert_eq!(cert.environment.as_deref(), Some("prod"));
        assert_eq!(cert.application_name.as_deref(), Some("billing"));
        assert_eq!(cert.keystore_path.as_deref(), Some("/opt/app/keystore.jks"));

        let calls = shell.calls.lock().unwrap();
        assert_eq!(calls[0].0, "scanner@app01");
        assert_eq!(calls[0].1, "keytool -list -v -keystore '/opt/app/keystore.jks'");
        assert_eq!(calls[0].2.as_deref(), Some("changeit"));
    }

    #[tokio::test]
    async fn test_kdb_keystore_lists_then_details() {
        let shell = Arc::new(
            FakeShell::default()
                .respond("mq01", "-cert -list", Ok("Certificates found\n-\tqm1 cert\n".into()))
                .respond(
                    "mq01",
                    "-cert -details",
                    Ok("Label : qm1 cert\nSerial : 0a\nNot After : March 4, 2026 12:00:00 PM GMT+00:00\n".into()),
                ),
        );
        let source = SshSource::new(
            config(vec![host("mq01", vec![kdb_keystore("/var/mqm/qmgrs/QM1/ssl/key.kdb")])]),
            shell.clone(),
        );

        let batch = source.fetch().await.unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].kind, CertificateKind::Kdb);
        assert_eq!(batch.rows[0].alias.as_deref(), Some("qm1 cert"));

        let calls = shell.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1.ends_with("-label 'qm1 cert'"));
        assert_eq!(calls[1].2, None);
    }

    #[tokio::test]
    async fn test_one_failing_host_becomes_a_warning() {
        let shell = Arc::new(
            FakeShell::default()
                .respond("app01", "keytool", Ok(KEYTOOL.into()))
                .respond("app02", "keytool", Err(SourceError::Unreachable("refused".into()))),
        );
        let source = SshSource::new(
            config(vec![
                host("app01", vec![java_keystore("/a.jks")]),
                host("app02", vec![java_keystore("/b.jks")]),
            ]),
            shell,
        );

        let batch = source.fetch().await.unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].starts_with("app02:/b.jks"));
    }

    #[tokio::test]
    async fn test_all_keystores_failing_fails_the_source() {
        let shell = Arc::new(
            FakeShell::default()
                .respond("app02", "keytool", Err(SourceError::Unreachable("refused".into()))),
        );
        let source = SshSource::new(config(vec![host("app02", vec![java_keystore("/b.jks")])]), shell);

        assert!(matches!(
            source.fetch().await,
            Err(SourceError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_java_password_is_reported() {
        let mut keystore = java_keystore("/a.jks");
        keystore.password = SecretRef::env("PORTALL_TEST_UNSET_KEYSTORE_PASSWORD");
        let source = SshSource::new(
            config(vec![host("app01", vec![keystore])]),
            Arc::new(FakeShell::default()),
        );

        assert!(matches!(
            source.fetch().await,
            Err(SourceError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/opt/a b.jks"), "'/opt/a b.jks'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
