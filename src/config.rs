use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;

use crate::{
    artifact::DEFAULT_DOWNLOAD_TIMEOUT,
    controller::ControllerOptions,
    error::ConfigError,
    imagerouter::{DEFAULT_API_BASE, DEFAULT_GENERATE_TIMEOUT},
};

/// Process settings read from the environment (a `.env` file is honoured by `main`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub api_base: String,
    pub config_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub generate_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: 8080,
            api_base: DEFAULT_API_BASE.to_string(),
            config_path: PathBuf::from("config.json"),
            artifact_dir: PathBuf::from("."),
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        let secs = |name: &str, fallback: Duration| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Settings {
            port: env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
            api_base: env::var("IMAGEROUTER_API_BASE").unwrap_or(defaults.api_base),
            config_path: env::var("CONFIG_PATH").map(PathBuf::from).unwrap_or(defaults.config_path),
            artifact_dir: env::var("ARTIFACT_DIR").map(PathBuf::from).unwrap_or(defaults.artifact_dir),
            generate_timeout: secs("GENERATE_TIMEOUT_SECS", defaults.generate_timeout),
            download_timeout: secs("DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout),
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            api_base: self.api_base.clone(),
            artifact_dir: self.artifact_dir.clone(),
            generate_timeout: self.generate_timeout,
            download_timeout: self.download_timeout,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default)]
    pub api_key: String,
}

/// Owns `config.json`. The controller only ever sees the key it is handed.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: StoredConfig,
}

impl ConfigStore {
    /// Reads the file, creating it with an empty key when it does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            let current = StoredConfig::default();
            write_config(&path, &current)?;
            info!("📝 Created {}", path.display());
            return Ok(Self { path, current });
        }
        let raw = fs::read_to_string(&path)?;
        let current: StoredConfig = serde_json::from_str(&raw)?;
        info!("📖 Config loaded from {}", path.display());
        Ok(Self { path, current })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn api_key(&self) -> &str { &self.current.api_key }

    pub fn has_api_key(&self) -> bool { !self.current.api_key.is_empty() }

    /// The config that would result from storing `key`, without touching disk.
    pub fn with_api_key(&self, key: &str) -> StoredConfig {
        StoredConfig { api_key: key.trim().to_string() }
    }

    /// Adopts a config that has already been written to `path()`.
    pub fn commit(&mut self, next: StoredConfig) {
        self.current = next;
    }

    /// Writes first; the in-memory key only changes once the file holds it.
    pub fn set_api_key(&mut self, key: &str) -> Result<(), ConfigError> {
        let next = self.with_api_key(key);
        write_config(&self.path, &next)?;
        self.commit(next);
        Ok(())
    }
}

pub fn write_config(path: &Path, config: &StoredConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}
