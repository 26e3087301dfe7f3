//! Outgoing email for userbase.
//!
//! Services hand finished messages to an [`EmailTransport`]. Which
//! transport is used is decided once, from the `[mail]` configuration.

mod memory;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{MailBackend, MailConfig};
use crate::Result;

pub use memory::MemoryTransport;
pub use smtp::SmtpTransport;

/// A finished email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// Optional HTML alternative.
    pub html: Option<String>,
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
}

impl OutgoingEmail {
    /// Create a plain text email to a single recipient.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            html: None,
            from: from.into(),
            to: vec![to.into()],
        }
    }

    /// Attach an HTML alternative.
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }
}

/// Something that delivers email.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Deliver one email. Failures are returned, never retried.
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Transport that only logs what would have been sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleTransport;

#[async_trait]
impl EmailTransport for ConsoleTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        info!(
            from = %email.from,
            to = %email.to.join(", "),
            subject = %email.subject,
            "Outgoing email\n{}",
            email.body
        );
        Ok(())
    }
}

/// Build the transport selected by `config`.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn EmailTransport>> {
    let transport: Arc<dyn EmailTransport> = match config.backend {
        MailBackend::Console => Arc::new(ConsoleTransport),
        MailBackend::Memory => Arc::new(MemoryTransport::new()),
        MailBackend::Smtp => Arc::new(SmtpTransport::new(config)?),
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_email_builder() {
        let email = OutgoingEmail::new("from@example.com", "to@example.com", "Hi", "Body")
            .with_html("<p>Body</p>");
        assert_eq!(email.to, vec!["to@example.com".to_string()]);
        assert_eq!(email.html.as_deref(), Some("<p>Body</p>"));
    }

    #[tokio::test]
    async fn test_console_transport_accepts_everything() {
        let email = OutgoingEmail::new("from@example.com", "to@example.com", "Hi", "Body");
        assert!(ConsoleTransport.send(&email).await.is_ok());
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let config = MailConfig {
            backend: MailBackend::Memory,
            ..Default::default()
        };
        let transport = from_config(&config).unwrap();
        let email = OutgoingEmail::new("from@example.com", "to@example.com", "Hi", "Body");
        transport.send(&email).await.unwrap();
    }

    #[test]
    fn test_from_config_smtp_without_host_fails() {
        let config = MailConfig {
            backend: MailBackend::Smtp,
            ..Default::default()
        };
        assert!(from_config(&config).is_err());
    }
}
