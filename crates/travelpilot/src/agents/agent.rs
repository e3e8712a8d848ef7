use async_trait::async_trait;
use thiserror::Error;

use super::extension::ExtensionError;
use crate::providers::errors::ProviderError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Execution(String),
}

/// A conversational agent that turns one prompt into one answer.
///
/// Whatever the agent needs to produce the answer (model calls, tool calls,
/// intermediate steps) stays behind this call.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn run(&self, prompt: &str) -> Result<String, AgentError>;
}
