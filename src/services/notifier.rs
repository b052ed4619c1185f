// src/services/notifier.rs

//! Change notification.
//!
//! Builds a plain-text message for a diff and hands it to a transport.
//! Exactly one delivery attempt is made per call; failures surface as
//! `AppError::Delivery` so the caller can downgrade them to a warning.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{Config, NotifyConfig, TransportKind};

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers a message somewhere.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Attempt delivery once.
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Composes change messages and sends them through a transport.
pub struct Notifier {
    transport: Box<dyn MailTransport>,
    sender: String,
    recipient: String,
    subject: String,
}

impl Notifier {
    /// Create a notifier with an explicit transport.
    pub fn new(config: &NotifyConfig, transport: Box<dyn MailTransport>) -> Self {
        Self {
            transport,
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
            subject: config.subject.clone(),
        }
    }

    /// Build the transport named in the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Box<dyn MailTransport> = match config.notify.transport {
            TransportKind::Log => Box::new(LogTransport),
            TransportKind::Sendgrid => Box::new(SendGridTransport::new(config)?),
            TransportKind::Smtp => smtp_transport(config)?,
        };
        Ok(Self::new(&config.notify, transport))
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Compose the message for a change in `name`.
    pub fn compose(&self, name: &str, diff_text: &str, captured_at: &DateTime<Utc>) -> Message {
        let body = format!(
            "The following changes were detected in {name}:\n\n{diff}\n\nCaptured at: {ts}\n",
            diff = diff_text.trim_end_matches('\n'),
            ts = captured_at.to_rfc3339(),
        );

        Message {
            from: self.sender.clone(),
            to: self.recipient.clone(),
            subject: self.subject.clone(),
            body,
        }
    }

    /// Send a diff to the configured recipient.
    pub async fn notify(
        &self,
        name: &str,
        diff_text: &str,
        captured_at: &DateTime<Utc>,
    ) -> Result<()> {
        let message = self.compose(name, diff_text, captured_at);
        self.transport.send(&message).await?;
        log::info!(
            "Notification for {} sent to {} via {}",
            name,
            self.recipient,
            self.transport.name()
        );
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        log::info!(
            "Notification (not emailed) to '{}': {}\n{}",
            message.to,
            message.subject,
            message.body
        );
        Ok(())
    }
}

/// SendGrid v3 HTTP API transport.
pub struct SendGridTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl SendGridTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .sendgrid_api_key
            .clone()
            .ok_or_else(|| AppError::config("SENDGRID_API_KEY is not set"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.notify.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.notify.sendgrid_endpoint.clone(),
            api_key,
        })
    }

    /// Request payload for a message.
    fn payload(message: &Message) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": message.from },
            "subject": message.subject,
            "content": [{ "type": "text/plain", "value": message.body }],
        })
    }
}

#[async_trait]
impl MailTransport for SendGridTransport {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(AppError::delivery)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::delivery(format!(
                "SendGrid returned {status}: {}",
                detail.trim()
            )));
        }
        log::debug!("SendGrid accepted message with status {}", status);
        Ok(())
    }
}

#[cfg(feature = "smtp")]
fn smtp_transport(config: &Config) -> Result<Box<dyn MailTransport>> {
    Ok(Box::new(smtp::SmtpTransport::new(config)?))
}

#[cfg(not(feature = "smtp"))]
fn smtp_transport(_config: &Config) -> Result<Box<dyn MailTransport>> {
    Err(AppError::config(
        "SMTP transport not compiled in (build with the `smtp` feature)",
    ))
}

#[cfg(feature = "smtp")]
mod smtp {
    use std::time::Duration;

    use async_trait::async_trait;
    use lettre::message::header::ContentType;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

    use super::{MailTransport, Message};
    use crate::error::{AppError, Result};
    use crate::models::Config;

    /// SMTP relay transport (STARTTLS, authenticated).
    pub struct SmtpTransport {
        mailer: AsyncSmtpTransport<Tokio1Executor>,
    }

    impl SmtpTransport {
        pub fn new(config: &Config) -> Result<Self> {
            let secrets = &config.secrets;
            let (Some(user), Some(pass)) = (&secrets.smtp_username, &secrets.smtp_password) else {
                return Err(AppError::config("SMTP_USERNAME / SMTP_PASSWORD are not set"));
            };

            let mailer =
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.notify.smtp_host)
                    .map_err(|e| AppError::config(format!("bad SMTP host: {e}")))?
                    .port(config.notify.smtp_port)
                    .credentials(Credentials::new(user.clone(), pass.clone()))
                    .timeout(Some(Duration::from_secs(config.notify.timeout_secs)))
                    .build();

            Ok(Self { mailer })
        }
    }

    #[async_trait]
    impl MailTransport for SmtpTransport {
        fn name(&self) -> &'static str {
            "smtp"
        }

        async fn send(&self, message: &Message) -> Result<()> {
            let email = lettre::Message::builder()
                .from(message.from.parse().map_err(AppError::delivery)?)
                .to(message.to.parse().map_err(AppError::delivery)?)
                .subject(message.subject.clone())
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone())
                .map_err(AppError::delivery)?;

            self.mailer
                .send(email)
                .await
                .map_err(AppError::delivery)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notify_config() -> NotifyConfig {
        NotifyConfig {
            sender: "watch@example.edu".into(),
            recipient: "chair@example.edu".into(),
            ..NotifyConfig::default()
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl MailTransport for FailingTransport {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn send(&self, _message: &Message) -> Result<()> {
            Err(AppError::delivery("535 authentication failed"))
        }
    }

    #[test]
    fn test_compose_message() {
        let notifier = Notifier::new(&notify_config(), Box::new(LogTransport));
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let message = notifier.compose("CS_criteria", "-C\n+D\n", &ts);

        assert_eq!(message.from, "watch@example.edu");
        assert_eq!(message.to, "chair@example.edu");
        assert_eq!(message.subject, "Accreditation Criteria Changes Detected");
        assert!(message.body.starts_with("The following changes were detected in CS_criteria:"));
        assert!(message.body.contains("-C\n+D\n\nCaptured at: 2026-10-19T09:00:00+00:00"));
    }

    #[test]
    fn test_sendgrid_payload() {
        let message = Message {
            from: "a@example.edu".into(),
            to: "b@example.edu".into(),
            subject: "S".into(),
            body: "diff".into(),
        };
        let payload = SendGridTransport::payload(&message);
        assert_eq!(payload["personalizations"][0]["to"][0]["email"], "b@example.edu");
        assert_eq!(payload["content"][0]["value"], "diff");
    }

    #[test]
    fn test_sendgrid_requires_api_key() {
        let mut config = Config::default();
        config.notify.transport = TransportKind::Sendgrid;
        assert!(matches!(
            Notifier::from_config(&config),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_is_delivery_error() {
        let notifier = Notifier::new(&notify_config(), Box::new(FailingTransport));
        let err = notifier
            .notify("CS_criteria", "+D", &Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_log_transport_succeeds() {
        let notifier = Notifier::new(&notify_config(), Box::new(LogTransport));
        assert!(notifier.notify("CS_criteria", "+D", &Utc::now()).await.is_ok());
    }
}
