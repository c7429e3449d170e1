//! Runtime configuration for the `noticd` binary.
//!
//! Every knob is a flag with an environment fallback, so containers can
//! configure the daemon without a wrapper script. Mail transport
//! settings are deliberately not here; they are env-only and read by
//! [`crate::settings::MailConfig`].

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "noticd")]
#[command(about = "Small-team IT helpdesk ticketing service")]
#[command(version)]
pub struct Args {
    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding ticket records and attachment folders
    #[arg(long, env = "TICKET_DIR", default_value = "Ticket")]
    pub ticket_dir: PathBuf,

    /// Storage backend: "fs" (default) or "db"/"sqlite"
    #[arg(long, env = "TICKET_BACKEND")]
    pub backend: Option<String>,

    /// SQLite database path. Setting this selects the db backend even
    /// without --backend.
    #[arg(long, env = "DB_FILE")]
    pub db_file: Option<PathBuf>,

    /// Known-requester directory used to fill in email addresses
    #[arg(long, env = "USERS_FILE", default_value = "users.json")]
    pub users_file: PathBuf,

    /// Admin-tunable settings file
    #[arg(long, env = "SETTINGS_FILE", default_value = "settings.json")]
    pub settings_file: PathBuf,

    /// Log filter applied when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
