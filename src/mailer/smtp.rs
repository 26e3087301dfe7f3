//! SMTP relay transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{EmailTransport, OutgoingEmail};
use crate::config::MailConfig;
use crate::{Result, UserbaseError};

fn mail_err(e: impl std::fmt::Display) -> UserbaseError {
    UserbaseError::Mail(e.to_string())
}

/// Delivers through an SMTP relay using STARTTLS.
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Build a transport from `[mail]` settings. No connection is made yet.
    pub fn new(config: &MailConfig) -> Result<Self> {
        if config.smtp_host.trim().is_empty() {
            return Err(UserbaseError::Config(
                "mail.smtp_host is required for the smtp backend".to_string(),
            ));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(mail_err)?
            .port(config.smtp_port);
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            inner: builder.build(),
        })
    }
}

/// Convert to a lettre message.
fn build_message(email: &OutgoingEmail) -> Result<Message> {
    let from: Mailbox = email.from.parse().map_err(mail_err)?;
    let mut builder = Message::builder().from(from).subject(email.subject.as_str());
    for to in &email.to {
        let mailbox: Mailbox = to.parse().map_err(mail_err)?;
        builder = builder.to(mailbox);
    }

    let message = match &email.html {
        Some(html) => builder
            .multipart(MultiPart::alternative_plain_html(
                email.body.clone(),
                html.clone(),
            ))
            .map_err(mail_err)?,
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(mail_err)?,
    };
    Ok(message)
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = build_message(email)?;
        self.inner.send(message).await.map_err(mail_err)?;
        debug!(to = %email.to.join(", "), subject = %email.subject, "Email relayed");
        Ok(())
    }
}
