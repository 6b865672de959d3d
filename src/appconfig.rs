use serde::{Deserialize, Serialize};
use std::{cell::OnceCell, env, fmt, fs, path::{Path, PathBuf}};

use crate::error::{Error, Result};
use crate::fs::candidate_config_paths;

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODELS: [&str; 5] = [
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AnthropicSection {
    #[serde(rename = "API_KEY", alias = "api_key")]
    pub api_key: Option<String>,
    pub models: Option<Vec<String>>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FileCfg {
    #[serde(rename = "ANTHROPIC", alias = "anthropic")]
    pub anthropic: Option<AnthropicSection>,
}

/// Secret key. Never printed, `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// `None` for blank input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() { None } else { Some(Self(trimmed.to_string())) }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Env,
    File(PathBuf),
    Prompt,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Env => write!(f, "env:{API_KEY_ENV}"),
            KeySource::File(p) => write!(f, "file:{}", p.display()),
            KeySource::Prompt => f.write_str("interactive input"),
        }
    }
}

pub fn read_config(path: &Path) -> Result<FileCfg> {
    let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads every existing path in order; broken files are logged and skipped.
pub fn load_configs(paths: &[PathBuf]) -> Vec<(PathBuf, FileCfg)> {
    paths
        .iter()
        .filter(|p| p.is_file())
        .filter_map(|p| match read_config(p) {
            Ok(cfg) => Some((p.clone(), cfg)),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        })
        .collect()
}

/// Finds the API key: env → explicit file → fallback files.
#[derive(Clone)]
pub struct KeyResolver {
    pub env_value: Option<String>,
    pub explicit: Option<PathBuf>,
    pub candidates: Vec<PathBuf>,
    loaded: OnceCell<Vec<(PathBuf, FileCfg)>>,
}

impl KeyResolver {
    pub fn new(env_value: Option<String>, explicit: Option<PathBuf>, candidates: Vec<PathBuf>) -> Self {
        Self {
            env_value,
            explicit,
            candidates,
            loaded: OnceCell::new(),
        }
    }

    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self::new(env::var(API_KEY_ENV).ok(), explicit, candidate_config_paths())
    }

    /// Parsed config files, read from disk on first use only.
    pub fn configs(&self) -> &[(PathBuf, FileCfg)] {
        self.loaded.get_or_init(|| load_configs(&self.search_paths()))
    }

    /// Explicit path (when it exists) followed by the fallback list.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(self.candidates.len() + 1);
        if let Some(p) = self.explicit.as_ref().filter(|p| p.exists()) {
            paths.push(p.clone());
        }
        paths.extend(self.candidates.iter().cloned());
        paths
    }

    pub fn resolve(&self) -> Result<(ApiKey, KeySource)> {
        if let Some(key) = self.env_value.clone().and_then(ApiKey::new) {
            return Ok((key, KeySource::Env));
        }

        for (path, cfg) in self.configs() {
            let key = cfg.anthropic.as_ref().and_then(|s| s.api_key.clone()).and_then(ApiKey::new);
            match key {
                Some(key) => return Ok((key, KeySource::File(path.clone()))),
                None => tracing::debug!("no API key in {}", path.display()),
            }
        }
        Err(Error::MissingApiKey)
    }

    /// Like `resolve`, but on a missing key prints the remedies and falls
    /// back to `prompt` once. `prompt` returns `None` when no input is available.
    pub fn resolve_with_prompt<F>(&self, prompt: F) -> Result<(ApiKey, KeySource)>
    where
        F: FnOnce() -> Option<String>,
    {
        match self.resolve() {
            Err(Error::MissingApiKey) => {
                println!("{}", Error::MissingApiKey);
                prompt()
                    .and_then(ApiKey::new)
                    .map(|key| (key, KeySource::Prompt))
                    .ok_or(Error::MissingApiKey)
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Effective {
    pub models: Vec<String>,
    pub base_url: String,
    pub settings_path: Option<PathBuf>,
}

/// CLI values win over the first config file that has an `[ANTHROPIC]` section,
/// which wins over the built-in defaults.
pub fn load_effective(configs: &[(PathBuf, FileCfg)], cli_models: Vec<String>, cli_base_url: Option<String>) -> Effective {
    let found = configs
        .iter()
        .find_map(|(p, cfg)| cfg.anthropic.clone().map(|s| (p.clone(), s)));
    let (settings_path, section) = match found {
        Some((p, s)) => (Some(p), s),
        None => (None, AnthropicSection::default()),
    };

    let models = if !cli_models.is_empty() {
        cli_models
    } else if let Some(m) = section.models.filter(|m| !m.is_empty()) {
        m
    } else {
        DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
    };

    let base_url = cli_base_url
        .or(section.base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    Effective {
        models: unique_models(models),
        base_url,
        settings_path,
    }
}

fn unique_models(models: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(models.len());
    for m in models {
        let m = m.trim().to_string();
        if !m.is_empty() && !out.contains(&m) {
            out.push(m);
        }
    }
    out
}
