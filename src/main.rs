use anyhow::{bail, Context};
use cart_pilot::{ChromeLauncher, Config, Orchestrator, RunMode, RunRequest};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cart-pilot", about = "Drive a browser from sign-in to checkout")]
struct Cli {
    /// Account identifier (usually an email address)
    #[arg(long, env = "CART_PILOT_IDENTIFIER")]
    identifier: String,

    /// Account secret; prefer the environment variable over the flag
    #[arg(long, env = "CART_PILOT_SECRET", hide_env_values = true)]
    secret: String,

    /// headless or headed
    #[arg(long, default_value = "headless")]
    mode: RunMode,

    /// JSON config file; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where run-scoped screenshot directories are created
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = cli.output_dir {
        config.diagnostics.output_dir = dir;
    }

    let orchestrator = Orchestrator::new(ChromeLauncher::new(), config)?;
    let request = RunRequest::new(cli.identifier, cli.secret, cli.mode);

    info!("Starting purchase run");
    let report = orchestrator
        .run_until(request, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, aborting run");
            } else {
                std::future::pending::<()>().await;
            }
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(failure) = &report.failure {
        error!(step = %failure.step, "Run failed: {}", failure.cause);
        bail!("run {} failed at {}: {}", report.run_id, failure.step, failure.cause);
    }
    info!(run_id = %report.run_id, "Run completed");
    Ok(())
}
