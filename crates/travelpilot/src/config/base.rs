use etcetera::{choose_app_strategy, AppStrategy, AppStrategyArgs};
use fs2::FileExt;
use once_cell::sync::{Lazy, OnceCell};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub static APP_STRATEGY: Lazy<AppStrategyArgs> = Lazy::new(|| AppStrategyArgs {
    top_level_domain: "in.sujay-hk".to_string(),
    author: "TravelPilot".to_string(),
    app_name: "travelpilot".to_string(),
});

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration value not found: {0}")]
    NotFound(String),
    #[error("Failed to deserialize value: {0}")]
    DeserializeError(String),
    #[error("Failed to read config file: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Failed to create config directory: {0}")]
    DirectoryError(String),
    #[error("Failed to lock config file: {0}")]
    LockError(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::DeserializeError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::DeserializeError(err.to_string())
    }
}

/// Configuration management for TravelPilot.
///
/// Values are loaded with the following precedence:
/// 1. Environment variables (key upper-cased, JSON-parsed when possible)
/// 2. Configuration file (~/.config/travelpilot/config.yaml by default)
///
/// Secrets follow the same order but fall back to a separate
/// `secrets.yaml` next to the config file, so an API key never has to be
/// written into the main config.
///
/// # Examples
///
/// ```no_run
/// use travelpilot::config::Config;
///
/// let config = Config::global();
/// let model: String = config
///     .get_param("TRAVELPILOT_MODEL")
///     .unwrap_or_else(|_| "gemini-2.5-flash".to_string());
/// ```
///
/// # Naming Convention
/// Keys are matched against environment variables in UPPERCASE, so
/// `google_api_key` and `GOOGLE_API_KEY` resolve the same environment value.
pub struct Config {
    config_path: PathBuf,
    secrets_path: PathBuf,
}

// Global instance
static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

impl Default for Config {
    fn default() -> Self {
        // - macOS/Linux: ~/.config/travelpilot/
        // - Windows:     ~\AppData\Roaming\TravelPilot\travelpilot\config\
        // without a home dir fall back to the working directory
        let config_dir = choose_app_strategy(APP_STRATEGY.clone())
            .map(|strategy| strategy.config_dir())
            .unwrap_or_else(|_| PathBuf::from(".travelpilot"));

        Config {
            config_path: config_dir.join("config.yaml"),
            secrets_path: config_dir.join("secrets.yaml"),
        }
    }
}

impl Config {
    /// Get the global configuration instance.
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// Create a configuration instance reading from custom paths
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(config_path: P1, secrets_path: P2) -> Self {
        Config {
            config_path: config_path.as_ref().to_path_buf(),
            secrets_path: secrets_path.as_ref().to_path_buf(),
        }
    }

    /// Load current values from the config file. A missing file is an empty config.
    pub fn load_values(&self) -> Result<HashMap<String, Value>, ConfigError> {
        load_yaml_map(&self.config_path)
    }

    /// Load current secrets from the secrets file
    pub fn load_secrets(&self) -> Result<HashMap<String, Value>, ConfigError> {
        load_yaml_map(&self.secrets_path)
    }

    /// Get a configuration value (non-secret).
    ///
    /// This will attempt to get the value from:
    /// 1. Environment variable with the upper-cased key name
    /// 2. Configuration file
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if:
    /// - The key doesn't exist in either environment or config file
    /// - The value cannot be deserialized into the requested type
    /// - There is an error reading the config file
    pub fn get_param<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T, ConfigError> {
        if let Some(value) = env_value(key) {
            return Ok(serde_json::from_value(value)?);
        }

        let values = self.load_values()?;
        values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))
            .and_then(|v| Ok(serde_json::from_value(v.clone())?))
    }

    /// Get a secret value, from the environment first and the secrets file second.
    pub fn get_secret<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T, ConfigError> {
        if let Some(value) = env_value(key) {
            return Ok(serde_json::from_value(value)?);
        }

        let values = self.load_secrets()?;
        values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))
            .and_then(|v| Ok(serde_json::from_value(v.clone())?))
    }

    /// Set a configuration value in the config file (non-secret).
    ///
    /// Environment variables still take precedence over the written value.
    pub fn set_param(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.load_values()?;
        values.insert(key.to_string(), value);
        save_yaml_map(&self.config_path, &values)
    }

    /// Store a secret in the secrets file
    pub fn set_secret(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.load_secrets()?;
        values.insert(key.to_string(), value);
        save_yaml_map(&self.secrets_path, &values)
    }
}

fn env_value(key: &str) -> Option<Value> {
    let val = env::var(key.to_uppercase()).ok()?;
    // plain strings are not valid JSON, keep them as strings
    Some(serde_json::from_str(&val).unwrap_or(Value::String(val)))
}

fn load_yaml_map(path: &Path) -> Result<HashMap<String, Value>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let yaml_value: serde_yaml::Value = serde_yaml::from_str(&content)?;
    let json_value: Value = serde_json::to_value(yaml_value)?;

    match json_value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => {
            tracing::warn!(path = ?path, "Config file is not a mapping, ignoring it");
            Ok(HashMap::new())
        }
    }
}

fn save_yaml_map(path: &Path, values: &HashMap<String, Value>) -> Result<(), ConfigError> {
    let yaml_value = serde_yaml::to_string(values)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryError(e.to_string()))?;
    }

    // Write to a temporary file first so readers never see a partial file
    let temp_path = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        file.lock_exclusive()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;

        file.write_all(yaml_value.as_bytes())?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}
