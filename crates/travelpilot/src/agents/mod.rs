mod agent;
pub mod extension;
pub mod extension_manager;
mod factory;
mod mcp_agent;
pub mod prompt;

pub use agent::{Agent, AgentError};
pub use extension::{ExtensionConfig, ExtensionError};
pub use extension_manager::ExtensionManager;
pub use factory::{AgentFactory, AgentSettings, DefaultAgentFactory};
pub use mcp_agent::{McpAgent, DEFAULT_MAX_STEPS};
