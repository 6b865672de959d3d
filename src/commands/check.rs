use anyhow::{Context, Result};
use clap::Args;
use std::{
    io::{self, BufRead, IsTerminal},
    path::PathBuf,
    time::Duration,
};

use crate::appconfig::load_effective;
use crate::context::AppCtx;
use crate::probe::{FailurePolicy, HttpTransport, probe_all};
use crate::report::{self, DEFAULT_REPORT_FILE};

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Model to probe (repeatable); replaces the configured list
    #[arg(long = "model", value_name = "ID")]
    pub models: Vec<String>,

    /// Where to write the report
    #[arg(long, default_value = DEFAULT_REPORT_FILE)]
    pub output: PathBuf,

    /// API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Keep probing after a failed model instead of discarding the batch
    #[arg(long)]
    pub keep_going: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl Default for CheckArgs {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            output: PathBuf::from(DEFAULT_REPORT_FILE),
            base_url: None,
            keep_going: false,
            timeout: None,
        }
    }
}

const KEY_PROMPT: &str = "Please enter your Anthropic API key";

/// Hidden prompt on a terminal, otherwise the first line of piped stdin.
fn prompt_api_key() -> Option<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        dialoguer::Password::new()
            .with_prompt(KEY_PROMPT)
            .interact()
            .map_err(|e| tracing::warn!("no interactive input: {e}"))
            .ok()
    } else {
        println!("{KEY_PROMPT}: ");
        read_key_line(stdin.lock())
    }
}

fn read_key_line(mut input: impl BufRead) -> Option<String> {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(e) => {
            tracing::warn!("cannot read API key from stdin: {e}");
            None
        }
    }
}

pub async fn run(ctx: &AppCtx, args: CheckArgs) -> Result<()> {
    let (key, source) = ctx.resolver.resolve_with_prompt(prompt_api_key)?;
    tracing::info!(%source, "API key resolved");

    let eff = load_effective(ctx.resolver.configs(), args.models, args.base_url);
    tracing::debug!(models = ?eff.models, base_url = %eff.base_url, "effective settings");

    let transport = HttpTransport::new(&eff.base_url, key, args.timeout.map(Duration::from_secs))
        .context("build HTTP client")?;
    let policy = if args.keep_going { FailurePolicy::PerModel } else { FailurePolicy::AbortBatch };

    let usage = probe_all(&transport, &eff.models, ctx.zone, policy).await;
    tracing::info!(rows = usage.len(), of = eff.models.len(), "probing done");
    for line in usage.failures() {
        println!("{line}");
    }

    let doc = report::render_document(ctx.zone, &usage);
    print!("\n{doc}");
    report::write_report(&args.output, &doc)
}
