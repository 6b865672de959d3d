use anyhow::{Context, Result};
use clap::Subcommand;
use std::{fs, path::Path};

use crate::appconfig::{API_KEY_ENV, load_effective};
use crate::context::AppCtx;
use crate::error::Error;
use crate::fs::{CONFIG_FILE_NAME, home_config_dir};

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigSub {
    /// Write a template config to ~/.anthropic_usage/config.toml
    Init,
    /// Show where the key and settings come from
    Show,
}

const TEMPLATE: &str = r#"# ~/.anthropic_usage/config.toml
[ANTHROPIC]
# API_KEY = "sk-ant-..."

# Models to probe, in table order. Defaults to the built-in list.
# models = ["claude-3-5-sonnet-20241022", "claude-3-5-haiku-20241022"]

# base_url = "https://api.anthropic.com/v1"
"#;

pub fn run(ctx: &AppCtx, sub: ConfigSub) -> Result<()> {
    match sub {
        ConfigSub::Init => init(&home_config_dir().join(CONFIG_FILE_NAME)),
        ConfigSub::Show => show(ctx),
    }
}

fn init(path: &Path) -> Result<()> {
    if path.exists() {
        println!("config exists: {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    fs::write(path, TEMPLATE).with_context(|| format!("write {}", path.display()))?;
    println!("created config: {}", path.display());
    Ok(())
}

fn show(ctx: &AppCtx) -> Result<()> {
    let r = &ctx.resolver;
    let paths = r.search_paths();

    println!("Timezone:  {}", ctx.zone);
    println!("Env:       {API_KEY_ENV} ({})", if r.env_value.is_some() { "set" } else { "not set" });
    println!("Search paths:");
    for p in &paths {
        println!("  [{}] {}", if p.is_file() { "x" } else { " " }, p.display());
    }

    // never the key itself, only where it came from
    match r.resolve() {
        Ok((_, source)) => println!("API key:   {source}"),
        Err(Error::MissingApiKey) => println!("API key:   not found"),
        Err(e) => return Err(e.into()),
    }

    let eff = load_effective(r.configs(), Vec::new(), None);
    println!("Settings:  {}", eff.settings_path.as_ref().map(|p| p.display().to_string()).unwrap_or("-".into()));
    println!("Base URL:  {}", eff.base_url);
    println!("Models:");
    for m in &eff.models {
        println!("  {m}");
    }
    Ok(())
}
