use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_MAX_TOKENS: i32 = 8192;

/// Configuration for model-specific settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// The name of the model to use
    pub model_name: String,
    /// Optional temperature setting (0.0 - 2.0 for Gemini)
    pub temperature: Option<f64>,
    /// Optional maximum tokens to generate
    pub max_tokens: Option<i32>,
}

impl ModelConfig {
    pub fn new(model_name: String) -> Self {
        Self {
            model_name,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temp: Option<f64>) -> Self {
        self.temperature = temp;
        self
    }

    /// Set the max tokens
    pub fn with_max_tokens(mut self, tokens: Option<i32>) -> Self {
        self.max_tokens = tokens;
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::new(DEFAULT_MODEL.to_string())
            .with_temperature(Some(DEFAULT_TEMPERATURE))
            .with_max_tokens(Some(DEFAULT_MAX_TOKENS))
    }
}
