use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::agent::{Agent, AgentError};
use super::extension::ExtensionConfig;
use super::extension_manager::ExtensionManager;
use super::mcp_agent::{McpAgent, DEFAULT_MAX_STEPS};
use crate::config::{Config, ConfigError};
use crate::model::{ModelConfig, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::providers::google::{GoogleProvider, GOOGLE_API_HOST};

/// Process-wide settings every agent is built from
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: ModelConfig,
    pub api_key: Option<String>,
    pub host: String,
    pub max_steps: usize,
    pub extensions: Vec<ExtensionConfig>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            api_key: None,
            host: GOOGLE_API_HOST.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            extensions: vec![ExtensionConfig::airbnb()],
        }
    }
}

fn param_or<T: DeserializeOwned>(config: &Config, key: &str, default: T) -> Result<T, ConfigError> {
    match config.get_param(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

impl AgentSettings {
    /// Read the settings from the environment and the config file, falling
    /// back to the defaults for anything unset. Malformed values are errors.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let model = ModelConfig::new(param_or(config, "TRAVELPILOT_MODEL", DEFAULT_MODEL.to_string())?)
            .with_temperature(Some(param_or(
                config,
                "TRAVELPILOT_TEMPERATURE",
                DEFAULT_TEMPERATURE,
            )?))
            .with_max_tokens(Some(param_or(
                config,
                "TRAVELPILOT_MAX_TOKENS",
                DEFAULT_MAX_TOKENS,
            )?));

        let api_key = config
            .get_secret::<String>("GOOGLE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            model,
            api_key,
            host: param_or(config, "GOOGLE_HOST", GOOGLE_API_HOST.to_string())?,
            max_steps: param_or(config, "TRAVELPILOT_MAX_STEPS", DEFAULT_MAX_STEPS)?,
            extensions: param_or(
                config,
                "TRAVELPILOT_EXTENSIONS",
                vec![ExtensionConfig::airbnb()],
            )?,
        })
    }
}

/// Produces a fresh, fully started agent for a new session
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Agent>, AgentError>;
}

/// Builds a Gemini-backed `McpAgent` with every configured extension started
pub struct DefaultAgentFactory {
    settings: AgentSettings,
}

impl DefaultAgentFactory {
    pub fn new(settings: AgentSettings) -> Self {
        if settings.api_key.is_none() {
            warn!("GOOGLE_API_KEY not found in the environment or config, agents cannot be created until it is set");
        }
        Self { settings }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }
}

#[async_trait]
impl AgentFactory for DefaultAgentFactory {
    async fn create(&self) -> Result<Arc<dyn Agent>, AgentError> {
        let api_key = self.settings.api_key.as_deref().ok_or_else(|| {
            AgentError::Configuration("GOOGLE_API_KEY is not set".to_string())
        })?;

        let provider =
            GoogleProvider::new(&self.settings.host, api_key, self.settings.model.clone())?;

        let mut extensions = ExtensionManager::new();
        for extension in &self.settings.extensions {
            extensions.add_extension(extension.clone()).await?;
        }
        info!(
            model = %self.settings.model.model_name,
            extensions = ?extensions.list_extensions(),
            "Agent created"
        );

        Ok(Arc::new(McpAgent::new(
            Arc::new(provider),
            extensions,
            self.settings.max_steps,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use tempfile::TempDir;

    fn empty_config() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let config = Config::new(
            dir.path().join("config.yaml"),
            dir.path().join("secrets.yaml"),
        );
        (dir, config)
    }

    const KEYS: [&str; 7] = [
        "TRAVELPILOT_MODEL",
        "TRAVELPILOT_TEMPERATURE",
        "TRAVELPILOT_MAX_TOKENS",
        "TRAVELPILOT_MAX_STEPS",
        "TRAVELPILOT_EXTENSIONS",
        "GOOGLE_API_KEY",
        "GOOGLE_HOST",
    ];

    #[test]
    #[serial]
    fn test_defaults_when_nothing_is_configured() {
        let (_dir, config) = empty_config();
        temp_env::with_vars_unset(KEYS, || {
            let settings = AgentSettings::from_config(&config).unwrap();
            assert_eq!(settings.model, ModelConfig::default());
            assert_eq!(settings.api_key, None);
            assert_eq!(settings.host, GOOGLE_API_HOST);
            assert_eq!(settings.max_steps, 10);
            assert_eq!(settings.extensions, vec![ExtensionConfig::airbnb()]);
        });
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        let (_dir, config) = empty_config();
        config
            .set_param("TRAVELPILOT_MAX_STEPS", json!(4))
            .unwrap();

        temp_env::with_vars_unset(KEYS, || {
            temp_env::with_vars(
                [
                    ("TRAVELPILOT_MODEL", Some("gemini-2.5-pro")),
                    ("TRAVELPILOT_TEMPERATURE", Some("0.3")),
                    ("GOOGLE_API_KEY", Some("abc")),
                    (
                        "TRAVELPILOT_EXTENSIONS",
                        Some(r#"[{"type":"stdio","name":"local","cmd":"node","args":["server.js"],"timeout":30}]"#),
                    ),
                ],
                || {
                    let settings = AgentSettings::from_config(&config).unwrap();
                    assert_eq!(settings.model.model_name, "gemini-2.5-pro");
                    assert_eq!(settings.model.temperature, Some(0.3));
                    assert_eq!(settings.api_key.as_deref(), Some("abc"));
                    // from the config file
                    assert_eq!(settings.max_steps, 4);
                    assert_eq!(settings.extensions.len(), 1);
                    assert_eq!(settings.extensions[0].name(), "local");
                    assert_eq!(settings.extensions[0].timeout_secs(), 30);
                },
            );
        });
    }

    #[test]
    #[serial]
    fn test_blank_key_counts_as_missing_and_bad_values_fail() {
        let (_dir, config) = empty_config();
        temp_env::with_vars_unset(KEYS, || {
            temp_env::with_var("GOOGLE_API_KEY", Some("  "), || {
                let settings = AgentSettings::from_config(&config).unwrap();
                assert!(settings.api_key.is_none());
            });
            temp_env::with_var("TRAVELPILOT_MAX_STEPS", Some("many"), || {
                assert!(matches!(
                    AgentSettings::from_config(&config),
                    Err(ConfigError::DeserializeError(_))
                ));
            });
        });
    }

    #[tokio::test]
    async fn test_create_without_key_is_a_configuration_error() {
        let factory = DefaultAgentFactory::new(AgentSettings::default());
        let err = factory.create().await.err().unwrap();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert_eq!(err.to_string(), "Configuration error: GOOGLE_API_KEY is not set");
    }

    #[tokio::test]
    async fn test_failing_extension_fails_creation() {
        let settings = AgentSettings {
            api_key: Some("test-key".to_string()),
            extensions: vec![ExtensionConfig::stdio(
                "missing",
                "travelpilot-no-such-mcp-server",
                vec![],
            )],
            ..AgentSettings::default()
        };
        let err = DefaultAgentFactory::new(settings).create().await.err().unwrap();
        assert!(matches!(err, AgentError::Extension(_)));
    }
}
