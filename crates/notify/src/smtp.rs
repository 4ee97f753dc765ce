//! SMTP relay mailer.

use crate::error::{NotifyError, NotifyResult};
use crate::{Email, Mailer};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use portall_core::config::SecretRef;
use std::time::Duration;

/// SMTP connection settings.
#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: SecretRef,
    pub starttls: bool,
    pub timeout_secs: u64,
}

/// Sends mail through an SMTP relay.
///
/// A username without a resolvable password does not fail construction.
/// Every send reports the missing credential instead, so only the jobs that
/// mail are affected.
pub struct SmtpMailer {
    from: Mailbox,
    transport: Result<AsyncSmtpTransport<Tokio1Executor>, String>,
}

impl SmtpMailer {
    pub fn new(from: &str, settings: &SmtpSettings) -> NotifyResult<Self> {
        let from = parse_mailbox(from)?;

        let mut builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };
        builder = builder
            .port(settings.port)
            .timeout(Some(Duration::from_secs(settings.timeout_secs)));

        let transport = match &settings.username {
            None => Ok(builder.build()),
            Some(username) => match settings.password.resolve() {
                Some(password) => Ok(builder
                    .credentials(Credentials::new(username.clone(), password))
                    .build()),
                None => Err(format!(
                    "smtp password for {username} ({}) is not set",
                    settings.password.describe()
                )),
            },
        };
        if let Err(reason) = &transport {
            tracing::warn!(host = %settings.host, "{reason}; mail will not be sent");
        }

        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> NotifyResult<()> {
        let transport = self
            .transport
            .as_ref()
            .map_err(|reason| NotifyError::MissingCredential(reason.clone()))?;

        let message = build_message(&self.from, email)?;
        transport.send(message).await?;
        tracing::debug!(to = ?email.to, subject = %email.subject, "Mail sent");
        Ok(())
    }
}

fn build_message(from: &Mailbox, email: &Email) -> NotifyResult<Message> {
    if email.to.is_empty() {
        return Err(NotifyError::NoRecipients);
    }
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    for to in &email.to {
        builder = builder.to(parse_mailbox(to)?);
    }
    Ok(builder.body(email.body.clone())?)
}

pub(crate) fn parse_mailbox(address: &str) -> NotifyResult<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(username: Option<&str>, password: SecretRef) -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 2525,
            username: username.map(str::to_string),
            password,
            starttls: false,
            timeout_secs: 1,
        }
    }

    fn email(to: &[&str]) -> Email {
        Email {
            to: to.iter().map(|s| s.to_string()).collect(),
            subject: "subject".to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_password_fails_on_send() {
        let mailer = SmtpMailer::new(
            "portall@example.com",
            &settings(Some("relay"), SecretRef::env("PORTALL_TEST_UNSET_SMTP_PASSWORD")),
        )
        .unwrap();

        let err = mailer.send(&email(&["ops@example.com"])).await.unwrap_err();
        assert!(matches!(err, NotifyError::MissingCredential(_)));
    }

    #[test]
    fn test_invalid_sender_is_rejected() {
        let result = SmtpMailer::new("not an address", &settings(None, SecretRef::default()));
        assert!(matches!(result, Err(NotifyError::InvalidAddress { .. })));
    }

    #[test]
    fn test_build_message_checks_recipients() {
        let from = parse_mailbox("portall@example.com").unwrap();
        assert!(matches!(
            build_message(&from, &email(&[])),
            Err(NotifyError::NoRecipients)
        ));
        assert!(matches!(
            build_message(&from, &email(&["bad address"])),
            Err(NotifyError::InvalidAddress { .. })
        ));
        assert!(build_message(&from, &email(&["a@example.com", "b@example.com"])).is_ok());
    }
}
