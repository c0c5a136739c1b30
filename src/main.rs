use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use referral_core::ReferralError;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::{
    commands::{status_of, Command, Commands, Context},
    config::Config,
    ledger::LedgerFile,
};

mod commands;
mod config;
mod ledger;

/// Referral program ledger: users, referral codes and signup rewards.
///
/// Every command prints a JSON payload on stdout. Failures print
/// `{"error", "status"}` on stderr and exit with 4 (not found), 5 (already
/// triggered), 6 (rejected), 7 (transient conflict) or 1 (anything else).
#[derive(Debug, Parser)]
#[command(name = "referral", version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(long, short, env = "REFERRAL_CONFIG", default_value = "referral.toml")]
    config: PathBuf,
    /// Ledger file to operate on (overrides the config).
    #[arg(long, env = "REFERRAL_STORE")]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => report(&err),
    }
}

fn run(cli: Cli) -> eyre::Result<String> {
    let config = Config::load(&cli.config, cli.store)?;
    let file = LedgerFile::open(&config.store, Duration::from_millis(config.lock_timeout_ms))?;
    let store = file.load()?;

    let output = cli.command.execute(&Context::new(&store, &config.retry))?;
    if cli.command.is_mutating() {
        file.save(&store)?;
        tracing::debug!(path = %file.path().display(), "ledger updated");
    }
    Ok(serde_json::to_string_pretty(&output)?)
}

fn report(err: &eyre::Report) -> ExitCode {
    let (status, exit) = match err.downcast_ref::<ReferralError>() {
        Some(err) => status_of(err.kind()),
        None => (500, 1),
    };
    tracing::debug!(?err, "command failed");
    eprintln!("{}", json!({ "error": format!("{err:#}"), "status": status }));
    ExitCode::from(exit)
}
