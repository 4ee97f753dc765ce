//! Outbound mail for Portall.
//!
//! Alert and report jobs build an [`Email`] and hand it to a [`Mailer`].
//! The transport is chosen by configuration: SMTP in production, the
//! console mailer for development, and [`MemoryMailer`] in tests.

pub mod error;
pub mod smtp;
pub mod template;

pub use error::{NotifyError, NotifyResult};
pub use smtp::{SmtpMailer, SmtpSettings};
pub use template::render;

use async_trait::async_trait;
use portall_core::config::{MailConfig, MailTransportConfig};
use std::sync::{Arc, Mutex};

/// A plain-text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> NotifyResult<()>;
}

/// Logs messages instead of sending them.
#[derive(Debug, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> NotifyResult<()> {
        if email.to.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            body = %email.body,
            "Mail (console transport)"
        );
        Ok(())
    }
}

/// Records messages in memory. Can be switched to fail every send.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> NotifyResult<()> {
        if email.to.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            return Err(NotifyError::MissingCredential(
                "memory mailer is set to fail".to_string(),
            ));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

/// Build the configured mailer.
pub fn from_config(config: &MailConfig) -> NotifyResult<Arc<dyn Mailer>> {
    match &config.transport {
        MailTransportConfig::Console => Ok(Arc::new(ConsoleMailer)),
        MailTransportConfig::Smtp {
            host,
            port,
            username,
            password,
            starttls,
            timeout_secs,
        } => {
            let settings = SmtpSettings {
                host: host.clone(),
                port: *port,
                username: username.clone(),
                password: password.clone(),
                starttls: *starttls,
                timeout_secs: *timeout_secs,
            };
            Ok(Arc::new(SmtpMailer::new(&config.from, &settings)?))
        }
    }
}
