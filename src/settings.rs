//! Admin-tunable settings and the mail transport configuration.
//!
//! Settings live in a JSON file admins edit through the console (or by
//! hand) and are re-read on every operation, so changes apply without a
//! restart. Mail transport configuration comes from the environment
//! only; it is deployment plumbing, not something admins adjust per
//! ticket.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Contents of the settings file. A partial file merges over these
/// defaults field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Admin console theme. Stored for the console; the ticket engine
    /// never reads it.
    #[serde(default = "default_theme")]
    pub theme: String,

    /// Prefix for generated ticket ids.
    #[serde(default = "default_ticket_prefix")]
    pub ticket_prefix: String,

    /// Login page logo URL, if any.
    #[serde(default)]
    pub login_logo: String,

    /// Hours until a new ticket is due.
    #[serde(default = "default_sla_hours")]
    pub sla_hours: f64,
}

fn default_theme() -> String {
    "dark".to_string()
}

fn default_ticket_prefix() -> String {
    "NTC".to_string()
}

fn default_sla_hours() -> f64 {
    24.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            ticket_prefix: default_ticket_prefix(),
            login_logo: String::new(),
            sla_hours: default_sla_hours(),
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub theme: Option<String>,
    pub ticket_prefix: Option<String>,
    pub login_logo: Option<String>,
    pub sla_hours: Option<f64>,
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the
    /// file is missing or malformed. Never fails.
    pub fn load(path: &Path) -> Settings {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Settings>(&content) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("failed to read settings, using defaults: {e}");
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!("failed to read settings, using defaults: {e}");
                Settings::default()
            }
        }
    }

    /// Apply a patch on top of the stored settings and persist the
    /// merged result.
    pub fn save(path: &Path, patch: &SettingsPatch) -> Result<Settings> {
        let mut merged = Settings::load(path);
        if let Some(theme) = &patch.theme {
            merged.theme = theme.clone();
        }
        if let Some(prefix) = &patch.ticket_prefix {
            merged.ticket_prefix = prefix.clone();
        }
        if let Some(logo) = &patch.login_logo {
            merged.login_logo = logo.clone();
        }
        if let Some(hours) = patch.sla_hours {
            merged.sla_hours = hours;
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&merged)?)?;
        Ok(merged)
    }

    /// The SLA window to apply to new tickets, in hours. A zero or
    /// negative stored value falls back to `SLA_HOURS`, then to 24.
    pub fn effective_sla_hours(&self) -> f64 {
        if self.sla_hours > 0.0 {
            return self.sla_hours;
        }
        env_sla_hours().unwrap_or_else(default_sla_hours)
    }

    /// `effective_sla_hours` rounded to whole minutes.
    pub fn sla_minutes(&self) -> i64 {
        (self.effective_sla_hours() * 60.0).round() as i64
    }
}

fn env_sla_hours() -> Option<f64> {
    env::var("SLA_HOURS")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|h| *h > 0.0)
}

/// Default SLA window in minutes for records hydrated without one.
///
/// Reads `SLA_HOURS` directly rather than the settings file, so storage
/// reads stay cheap and deterministic.
pub fn default_sla_minutes() -> i64 {
    let hours = env_sla_hours().unwrap_or_else(default_sla_hours);
    (hours * 60.0).round() as i64
}

/// Which transport outgoing mail uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailMode {
    Smtp,
    Graph,
}

impl fmt::Display for MailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailMode::Smtp => write!(f, "smtp"),
            MailMode::Graph => write!(f, "graph"),
        }
    }
}

/// Mail transport configuration, read from the environment at startup.
pub struct MailConfig {
    pub use_graph: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Implicit TLS (SMTPS) instead of STARTTLS.
    pub smtp_secure: bool,
    pub smtp_user: String,
    pub smtp_pass: SecretBox<String>,
    /// From address for SMTP sends.
    pub from_email: String,
    /// Helpdesk inbox notified when a ticket is created.
    pub to_email: String,
    pub azure_tenant: String,
    pub azure_client_id: String,
    pub azure_client_secret: SecretBox<String>,
    /// Mailbox the Graph sendMail call is issued as.
    pub graph_sender: String,
    /// Public base URL used to build ticket links in mail bodies.
    pub base_url: String,
}

impl MailConfig {
    pub fn from_env() -> MailConfig {
        MailConfig {
            use_graph: env_str("USE_GRAPH") == "true",
            smtp_host: env_str("SMTP_HOST"),
            smtp_port: env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            smtp_secure: env_str("SMTP_SECURE") == "true",
            smtp_user: env_str("SMTP_USER"),
            smtp_pass: SecretBox::new(Box::new(env_str("SMTP_PASS"))),
            from_email: env_str("FROM_EMAIL"),
            to_email: env_str("TO_EMAIL"),
            azure_tenant: env_str("AZURE_TENANT_ID"),
            azure_client_id: env_str("AZURE_CLIENT_ID"),
            azure_client_secret: SecretBox::new(Box::new(env_str("AZURE_CLIENT_SECRET"))),
            graph_sender: env_str("GRAPH_SENDER_UPN"),
            base_url: {
                let v = env_str("BASE_URL");
                if v.is_empty() {
                    "http://localhost:3000".to_string()
                } else {
                    v
                }
            },
        }
    }

    pub fn mode(&self) -> MailMode {
        if self.use_graph {
            MailMode::Graph
        } else {
            MailMode::Smtp
        }
    }

    /// Environment variables the selected transport still needs before
    /// it can send anything. Health output points straight at these.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self.mode() {
            MailMode::Graph => {
                if self.azure_tenant.is_empty() {
                    missing.push("AZURE_TENANT_ID");
                }
                if self.azure_client_id.is_empty() {
                    missing.push("AZURE_CLIENT_ID");
                }
                if self.azure_client_secret.expose_secret().is_empty() {
                    missing.push("AZURE_CLIENT_SECRET");
                }
                if self.graph_sender.is_empty() {
                    missing.push("GRAPH_SENDER_UPN");
                }
            }
            MailMode::Smtp => {
                if self.smtp_host.is_empty() {
                    missing.push("SMTP_HOST");
                }
                if env_str("SMTP_PORT").is_empty() {
                    missing.push("SMTP_PORT");
                }
                if self.from_email.is_empty() {
                    missing.push("FROM_EMAIL");
                }
            }
        }
        missing
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("use_graph", &self.use_graph)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_secure", &self.smtp_secure)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"[REDACTED]")
            .field("from_email", &self.from_email)
            .field("to_email", &self.to_email)
            .field("azure_tenant", &self.azure_tenant)
            .field("azure_client_id", &self.azure_client_id)
            .field("azure_client_secret", &"[REDACTED]")
            .field("graph_sender", &self.graph_sender)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn env_str(key: &str) -> String {
    env::var(key).unwrap_or_default()
}
