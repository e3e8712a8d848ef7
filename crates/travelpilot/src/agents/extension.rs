use std::collections::HashMap;

use mcp_client::client::Error as ClientError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, ConfigError};

pub const DEFAULT_EXTENSION_TIMEOUT: u64 = 300;

/// Errors from extension operation
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Failed to start the MCP server from configuration `{0}` `{1}`")]
    Initialization(Box<ExtensionConfig>, ClientError),
    #[error("Failed a client call to an MCP server: {0}")]
    Client(#[from] ClientError),
    #[error("Transport error: {0}")]
    Transport(#[from] mcp_client::transport::Error),
    #[error("Missing environment value `{0}` for extension: {1}")]
    MissingEnv(String, ConfigError),
    #[error("No extension provides the tool `{0}`")]
    UnknownTool(String),
}

pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// How to launch a tool server
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ExtensionConfig {
    /// Tool server spawned as a child process and spoken to over stdio
    #[serde(rename = "stdio")]
    Stdio {
        /// The name used to identify this extension, also the tool name prefix
        name: String,
        cmd: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        envs: HashMap<String, String>,
        /// Keys resolved through the config (environment or secrets file) at launch
        #[serde(default)]
        env_keys: Vec<String>,
        /// Per-request timeout in seconds
        timeout: Option<u64>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self::airbnb()
    }
}

impl ExtensionConfig {
    /// The Airbnb search server from the OpenBnB project
    pub fn airbnb() -> Self {
        Self::Stdio {
            name: "airbnb".to_string(),
            cmd: "npx".to_string(),
            args: vec![
                "-y".to_string(),
                "@openbnb/mcp-server-airbnb".to_string(),
                "--ignore-robots-txt".to_string(),
            ],
            envs: HashMap::new(),
            env_keys: Vec::new(),
            timeout: Some(DEFAULT_EXTENSION_TIMEOUT),
            description: Some("Search Airbnb listings and fetch listing details".to_string()),
        }
    }

    pub fn stdio<S: Into<String>, C: Into<String>>(name: S, cmd: C, args: Vec<String>) -> Self {
        Self::Stdio {
            name: name.into(),
            cmd: cmd.into(),
            args,
            envs: HashMap::new(),
            env_keys: Vec::new(),
            timeout: Some(DEFAULT_EXTENSION_TIMEOUT),
            description: None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Stdio { name, .. } => name,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            Self::Stdio { cmd, .. } => cmd,
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        match self {
            Self::Stdio { timeout, .. } => timeout.unwrap_or(DEFAULT_EXTENSION_TIMEOUT),
        }
    }

    /// Environment for the child process: literal `envs` plus every `env_keys` entry
    pub fn resolve_envs(&self, config: &Config) -> ExtensionResult<HashMap<String, String>> {
        match self {
            Self::Stdio { envs, env_keys, .. } => {
                let mut resolved = envs.clone();
                for key in env_keys {
                    let value: String = config
                        .get_secret(key)
                        .map_err(|e| ExtensionError::MissingEnv(key.clone(), e))?;
                    resolved.insert(key.clone(), value);
                }
                Ok(resolved)
            }
        }
    }
}

impl std::fmt::Display for ExtensionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionConfig::Stdio {
                name, cmd, args, ..
            } => write!(f, "Stdio({}: {} {})", name, cmd, args.join(" ")),
        }
    }
}
