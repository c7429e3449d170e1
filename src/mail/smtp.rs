//! SMTP delivery via lettre.

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::ExposeSecret;

use crate::error::{NoticError, Result};
use crate::mail::Mailer;
use crate::settings::MailConfig;

static STRIP_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag strip regex should be valid"));

#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport from environment-derived config. No
    /// connection is made until the first send.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(NoticError::Config("SMTP_HOST is not set".to_string()));
        }
        let from: Mailbox = config.from_email.parse().map_err(|e| {
            NoticError::Config(format!("invalid FROM_EMAIL '{}': {e}", config.from_email))
        })?;

        // SMTP_SECURE selects implicit TLS on connect; otherwise the
        // connection starts plain and STARTTLS is required.
        let mut builder = if config.smtp_secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        }
        .port(config.smtp_port);

        if !config.smtp_user.is_empty() && !config.smtp_pass.expose_secret().is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.expose_secret().clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &[String], subject: &str, html: &str) -> Result<()> {
        if to.is_empty() {
            return Ok(());
        }
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for address in to {
            let mailbox: Mailbox = address.parse().map_err(|e| {
                NoticError::Notification(format!("invalid recipient '{address}': {e}"))
            })?;
            builder = builder.to(mailbox);
        }
        // Clients that refuse HTML get the body with tags stripped.
        let text = STRIP_TAGS.replace_all(html, "").to_string();
        let message = builder
            .multipart(MultiPart::alternative_plain_html(text, html.to_string()))
            .map_err(|e| NoticError::Notification(format!("failed to build message: {e}")))?;
        self.transport.send(message).await?;
        Ok(())
    }
}
