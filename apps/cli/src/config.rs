use mediabrowse_catalog::CatalogConfig;
use mediabrowse_media_session::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "mediabrowse";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "mediabrowse.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no {0} directory available on this platform")]
    NoDirectory(&'static str),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Contents of `config.toml`; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub provider: ProviderConfig,
}

impl Config {
    /// Load `path`, or the defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::NoDirectory("config"))?
        .join(APP_DIR)
        .join(CONFIG_FILE))
}

/// Directory for the settings database and logs
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    Ok(dirs::data_dir()
        .ok_or(ConfigError::NoDirectory("data"))?
        .join(APP_DIR))
}

pub fn db_path() -> Result<PathBuf, ConfigError> {
    Ok(data_dir()?.join(DB_FILE))
}
