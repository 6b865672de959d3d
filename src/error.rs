use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "
        No API key found. Please:
        1. Create a config.toml file with an [ANTHROPIC] section and API_KEY
        2. Set the ANTHROPIC_API_KEY environment variable
        3. Manually input API key when prompted
        "
    )]
    MissingApiKey,

    #[error("error reading configuration file {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing configuration file {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("request for {model} failed: {source}")]
    Transport {
        model: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
