//! Outbound notification mail.
//!
//! Two transports share one [`Mailer`] trait: direct SMTP via lettre,
//! and Microsoft Graph `sendMail` for tenants that block relay ports.
//! `USE_GRAPH=true` selects Graph, anything else selects SMTP. All
//! sends go through [`notify`], which bounds the wait on a slow
//! transport and never surfaces a failure to the caller.

mod graph;
mod smtp;
pub mod templates;

use std::sync::Arc;
use std::time::Duration;

pub use graph::GraphMailer;
pub use smtp::SmtpMailer;

use crate::error::Result;
use crate::settings::{MailConfig, MailMode};

/// How long a request handler waits on a send before moving on. The
/// send itself keeps running in the background.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one HTML message to an already-normalized recipient
    /// list. Empty list is a no-op, not an error.
    async fn send(&self, to: &[String], subject: &str, html: &str) -> Result<()>;
}

/// Transport that drops everything. Used when mail is unconfigured so
/// the rest of the system never has to care.
pub struct NullMailer;

#[async_trait::async_trait]
impl Mailer for NullMailer {
    async fn send(&self, to: &[String], subject: &str, _html: &str) -> Result<()> {
        tracing::debug!("mail disabled, dropping '{subject}' to {to:?}");
        Ok(())
    }
}

/// Build the transport selected by the environment. A transport that
/// cannot be constructed degrades to [`NullMailer`] with a warning
/// rather than failing startup.
pub fn build_mailer(config: &MailConfig) -> Arc<dyn Mailer> {
    let built: Result<Arc<dyn Mailer>> = match config.mode() {
        MailMode::Graph => GraphMailer::from_config(config).map(|m| Arc::new(m) as _),
        MailMode::Smtp => SmtpMailer::from_config(config).map(|m| Arc::new(m) as _),
    };
    match built {
        Ok(mailer) => mailer,
        Err(e) => {
            tracing::warn!("mail transport unavailable, notifications disabled: {e}");
            Arc::new(NullMailer)
        }
    }
}

/// Split mixed `,`/`;` delimited address strings, trim, and drop
/// duplicates while keeping first-seen order.
pub fn normalize_recipients<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = Vec::new();
    for item in raw {
        for part in item.as_ref().split([';', ',']) {
            let part = part.trim();
            if !part.is_empty() && !seen.iter().any(|s| s == part) {
                seen.push(part.to_string());
            }
        }
    }
    seen
}

/// Fire-and-forget delivery: normalize recipients, spawn the send, and
/// wait at most [`NOTIFY_TIMEOUT`] for it. Failures and timeouts are
/// logged, never returned, so a hung relay cannot stall or roll back
/// the ticket mutation that triggered the mail.
pub async fn notify(mailer: &Arc<dyn Mailer>, to: &[String], subject: &str, html: &str) {
    let recipients = normalize_recipients(to);
    if recipients.is_empty() {
        return;
    }
    let mailer = Arc::clone(mailer);
    let subject = subject.to_string();
    let html = html.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = mailer.send(&recipients, &subject, &html).await {
            tracing::warn!("notification send failed: {e}");
        }
    });
    if tokio::time::timeout(NOTIFY_TIMEOUT, handle).await.is_err() {
        tracing::warn!("notification send still running after {NOTIFY_TIMEOUT:?}, not waiting");
    }
}
