use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use mcp_client::client::{ClientCapabilities, ClientInfo, McpClient, McpClientTrait};
use mcp_client::transport::{StdioTransport, Transport};
use rmcp::model::{Content, Tool};
use serde_json::Value;
use tracing::{debug, instrument};

use super::extension::{ExtensionConfig, ExtensionError, ExtensionResult};
use crate::config::Config;
use crate::message::{ToolCall, ToolError, ToolResult};

type McpClientBox = Arc<dyn McpClientTrait>;

/// Separates the extension name from the tool name in prefixed tool names
pub const TOOL_PREFIX_SEPARATOR: &str = "__";

/// Owns the MCP clients of an agent's extensions.
///
/// Tools are exposed to the model as `{extension}__{tool}` so that two
/// servers offering a tool with the same name never collide. Dropping the
/// manager drops the clients, which stops their server processes.
#[derive(Default)]
pub struct ExtensionManager {
    clients: HashMap<String, McpClientBox>,
    instructions: HashMap<String, String>,
}

/// Lowercase ASCII alphanumerics, `-` and `_` are kept; anything else becomes `_`
pub fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch the server described by `config` and complete the MCP handshake
    #[instrument(skip(self, config), fields(extension = %config.name()))]
    pub async fn add_extension(&mut self, config: ExtensionConfig) -> ExtensionResult<()> {
        let name = normalize(config.name());
        let envs = config.resolve_envs(Config::global())?;
        let timeout = Duration::from_secs(config.timeout_secs());

        let mut client = match &config {
            ExtensionConfig::Stdio { cmd, args, .. } => {
                let transport = StdioTransport::new(cmd, args.clone(), envs);
                let handle = transport.start().await?;
                McpClient::connect(handle, timeout)
                    .await
                    .map_err(|e| ExtensionError::Initialization(Box::new(config.clone()), e))?
            }
        };

        let info = ClientInfo {
            name: "travelpilot".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let init_result = client
            .initialize(info, ClientCapabilities::default())
            .await
            .map_err(|e| ExtensionError::Initialization(Box::new(config.clone()), e))?;

        if let Some(instructions) = init_result.instructions {
            self.instructions.insert(name.clone(), instructions);
        }

        debug!(server = %init_result.server_info.name, "Extension started");
        self.add_client(name, Box::new(client));
        Ok(())
    }

    /// Register an already initialized client under `name`
    pub fn add_client(&mut self, name: String, client: Box<dyn McpClientTrait>) {
        self.clients.insert(name, Arc::from(client));
    }

    pub fn list_extensions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instructions the servers sent back during `initialize`, keyed by extension
    pub fn instructions(&self) -> &HashMap<String, String> {
        &self.instructions
    }

    /// Get all tools from all clients with proper prefixing
    pub async fn get_prefixed_tools(&self) -> ExtensionResult<Vec<Tool>> {
        let listings = self.clients.iter().map(|(name, client)| async move {
            let mut tools = Vec::new();
            let mut cursor = None;
            loop {
                let page = client.list_tools(cursor).await?;
                tools.extend(page.tools.into_iter().map(|tool| Tool {
                    name: Cow::Owned(format!("{}{}{}", name, TOOL_PREFIX_SEPARATOR, tool.name)),
                    ..tool
                }));
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            Ok::<_, ExtensionError>(tools)
        });

        let mut tools: Vec<Tool> = future::try_join_all(listings)
            .await?
            .into_iter()
            .flatten()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    fn resolve_tool<'a>(&self, prefixed_name: &'a str) -> Option<(&McpClientBox, &'a str)> {
        self.clients.iter().find_map(|(name, client)| {
            prefixed_name
                .strip_prefix(name.as_str())
                .and_then(|rest| rest.strip_prefix(TOOL_PREFIX_SEPARATOR))
                .map(|tool_name| (client, tool_name))
        })
    }

    /// Route a prefixed tool call to the extension that owns it
    #[instrument(skip(self, tool_call), fields(tool = %tool_call.name))]
    pub async fn dispatch_tool_call(&self, tool_call: ToolCall) -> ToolResult<Vec<Content>> {
        let (client, tool_name) = self.resolve_tool(&tool_call.name).ok_or_else(|| {
            ToolError::NotFound(ExtensionError::UnknownTool(tool_call.name.clone()).to_string())
        })?;

        let arguments = match tool_call.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let result = client
            .call_tool(tool_name, arguments)
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;

        if result.is_error == Some(true) {
            let text = result
                .content
                .iter()
                .filter_map(|c| c.as_text().map(|t| t.text.clone()))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ToolError::ExecutionError(text));
        }

        Ok(result.content)
    }
}
