use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::feed::DEFAULT_MAX_CONCURRENT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory of exported show snapshots served to the merge engine
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    #[serde(default = "default_max_concurrent_refreshes")]
    pub max_concurrent_refreshes: usize,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("podshelf")
}

fn default_db_path() -> String {
    data_dir().join("library.db").to_string_lossy().to_string()
}

fn default_snapshot_dir() -> String {
    data_dir().join("snapshots").to_string_lossy().to_string()
}

fn default_max_concurrent_refreshes() -> usize {
    DEFAULT_MAX_CONCURRENT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            snapshot_dir: default_snapshot_dir(),
            max_concurrent_refreshes: default_max_concurrent_refreshes(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&Self::config_path())?;
        if let Some(parent) = PathBuf::from(&config.db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(config)
    }

    /// Read the config at `path`, writing the defaults there if it does not exist yet
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            if config.max_concurrent_refreshes == 0 {
                return Err(AppError::Config(
                    "max_concurrent_refreshes must be at least 1".to_string(),
                ));
            }
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podshelf")
            .join("config.toml")
    }
}
