//! Outbound email transports.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

use lostfound_core::{defaults, Error, Result};

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Something that can deliver an email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `message`. Returns the relay's reference for the message.
    async fn send(&self, message: &EmailMessage) -> Result<String>;
}

/// Deliver a message whose failure must not affect the caller.
///
/// Logs the outcome and reports whether delivery succeeded.
pub async fn send_best_effort(mailer: &dyn Mailer, message: &EmailMessage) -> bool {
    match mailer.send(message).await {
        Ok(reference) => {
            info!(
                subsystem = "notify",
                component = "mailer",
                recipient = %message.to,
                reference = %reference,
                "Email sent"
            );
            true
        }
        Err(e) => {
            error!(
                subsystem = "notify",
                component = "mailer",
                recipient = %message.to,
                error = %e,
                "Failed to send email"
            );
            false
        }
    }
}

// =============================================================================
// SMTP
// =============================================================================

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Login name; also the sender address.
    pub username: String,
    pub password: String,
    /// Display name of the sender.
    pub from_name: String,
}

impl SmtpConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: defaults::SMTP_HOST.to_string(),
            port: defaults::SMTP_PORT,
            username: username.into(),
            password: password.into(),
            from_name: defaults::MAIL_FROM_NAME.to_string(),
        }
    }
}

/// Mailer backed by an authenticated STARTTLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let address: Address = config
            .username
            .parse()
            .map_err(|e| Error::Config(format!("Invalid sender address: {}", e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| Error::Config(format!("Invalid SMTP relay {}: {}", config.host, e)))?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        info!(
            subsystem = "notify",
            component = "smtp",
            host = %config.host,
            port = config.port,
            "SMTP mailer configured"
        );

        Ok(Self {
            transport,
            from: Mailbox::new(Some(config.from_name), address),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| Error::Mail(format!("Invalid recipient {}: {}", message.to, e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| Error::Mail(e.to_string()))?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| Error::Mail(e.to_string()))?;

        Ok(response.message().collect::<Vec<_>>().join(" "))
    }
}

// =============================================================================
// NON-DELIVERING MAILERS
// =============================================================================

/// Logs messages instead of sending them. Used when no relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        info!(
            subsystem = "notify",
            component = "log_mailer",
            recipient = %message.to,
            subject = %message.subject,
            "Email not delivered, no SMTP relay configured"
        );
        Ok("logged".to_string())
    }
}

/// Captures messages in memory and can be told to fail for some recipients.
#[derive(Debug, Default, Clone)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to `recipient` fail.
    pub fn fail_for(self, recipient: impl Into<String>) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(recipient.into());
        self
    }

    /// Messages delivered so far.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages delivered to `recipient`.
    pub fn sent_to(&self, recipient: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == recipient)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&message.to);
        if failing {
            return Err(Error::Mail(format!("Relay rejected {}", message.to)));
        }
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        sent.push(message.clone());
        Ok(format!("recorded-{}", sent.len()))
    }
}
