use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use notic::config::Args;
use notic::desk::Desk;
use notic::directory::Directory;
use notic::error::Result;
use notic::mail::build_mailer;
use notic::server;
use notic::settings::MailConfig;
use notic::store::open_store;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins when set; otherwise fall back to --log-level.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("notic={0},noticd={0},info", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mail = MailConfig::from_env();
    let store = open_store(
        &args.ticket_dir,
        args.backend.as_deref(),
        args.db_file.as_deref(),
    )?;
    let mailer = build_mailer(&mail);
    let directory = Directory::load(&args.users_file);
    let desk = Desk::new(store, mailer, directory, args.settings_file.clone(), &mail);

    tracing::info!(
        "ticket store: {} backend at {}",
        desk.backend(),
        desk.ticket_dir().display()
    );
    tracing::info!("mail transport: {}", mail.mode());
    tracing::info!("directory: {} users loaded", desk.directory().users().len());

    server::run(args.listen_addr(), Arc::new(desk)).await
}
