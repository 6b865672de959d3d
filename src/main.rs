use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod appconfig;
mod commands;
mod context;
mod error;
mod format;
mod fs;
mod probe;
mod report;

use commands::{CheckArgs, ConfigSub, check, config_cmd};
use context::AppCtx;
use format::LocalZone;

#[derive(Parser)]
#[command(name = "anthropic-usage", version, about = "Show Anthropic API rate limits per model")]
struct Cli {
    /// Config file to try before the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Probe every model and print the rate limit table (default)
    Check(CheckArgs),

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        sub: ConfigSub,
    },
}

async fn run(cli: Cli, zone: LocalZone) -> Result<()> {
    let ctx = AppCtx::new(zone, cli.config);
    match cli.cmd.unwrap_or_else(|| Cmd::Check(CheckArgs::default())) {
        Cmd::Check(args) => check::run(&ctx, args).await,
        Cmd::Config { sub } => config_cmd::run(&ctx, sub),
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Ignore result
    let _ = dotenvy::dotenv();
    init_logging();

    // still single-threaded here, so the local offset is readable
    let zone = LocalZone::detect();

    let cli = Cli::parse();
    if let Err(e) = run(cli, zone).await {
        println!("❌ Error: {e:#}");
    }
}
