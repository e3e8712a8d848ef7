use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use rmcp::model::Role;
use tracing::{debug, info, instrument};

use super::agent::{Agent, AgentError};
use super::extension_manager::ExtensionManager;
use super::prompt::{system_prompt, STEP_LIMIT_INSTRUCTION, STEP_LIMIT_MESSAGE};
use crate::message::{Message, MessageContent, ToolRequest};
use crate::providers::base::Provider;

pub const DEFAULT_MAX_STEPS: usize = 10;

/// Tool-calling agent backed by an LLM provider and a set of MCP extensions.
///
/// Each step is one model call; when the model asks for tools, every request
/// is dispatched to its extension and the results are sent back on the next
/// step. After `max_steps` steps one more call is made with no tools
/// offered, so the model has to answer with what it gathered.
pub struct McpAgent {
    provider: Arc<dyn Provider>,
    extensions: ExtensionManager,
    max_steps: usize,
}

impl McpAgent {
    pub fn new(provider: Arc<dyn Provider>, extensions: ExtensionManager, max_steps: usize) -> Self {
        Self {
            provider,
            extensions,
            max_steps,
        }
    }

    pub fn extensions(&self) -> &ExtensionManager {
        &self.extensions
    }

    async fn dispatch_tool_requests(&self, requests: &[ToolRequest]) -> Message {
        let results = future::join_all(requests.iter().map(|request| async move {
            match &request.tool_call {
                Ok(call) => (
                    call.name.clone(),
                    self.extensions.dispatch_tool_call(call.clone()).await,
                ),
                Err(e) => ("unknown".to_string(), Err(e.clone())),
            }
        }))
        .await;

        requests
            .iter()
            .zip(results)
            .fold(Message::user(), |message, (request, (name, result))| {
                if let Err(e) = &result {
                    debug!(tool = %name, error = %e, "Tool call failed");
                }
                message.with_tool_response(request.id.clone(), name, result)
            })
    }
}

#[async_trait]
impl Agent for McpAgent {
    #[instrument(skip(self, prompt), fields(max_steps = self.max_steps))]
    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        let tools = self.extensions.get_prefixed_tools().await?;
        let system = system_prompt(&tools, self.extensions.instructions());
        let mut messages = vec![Message::user().with_text(prompt)];

        for step in 1..=self.max_steps {
            let (response, usage) = self.provider.complete(&system, &messages, &tools).await?;
            debug!(
                step,
                model = %usage.model,
                total_tokens = ?usage.usage.total_tokens,
                "Model responded"
            );

            let requests: Vec<ToolRequest> =
                response.tool_requests().into_iter().cloned().collect();
            if requests.is_empty() {
                return Ok(response.as_concat_text());
            }
            messages.push(response);

            let tool_responses = self.dispatch_tool_requests(&requests).await;
            messages.push(tool_responses);
        }

        info!(
            max_steps = self.max_steps,
            "Step limit reached, asking for a final answer"
        );
        match messages.last_mut() {
            Some(last) if last.role == Role::User => {
                last.content.push(MessageContent::text(STEP_LIMIT_INSTRUCTION));
            }
            _ => messages.push(Message::user().with_text(STEP_LIMIT_INSTRUCTION)),
        }

        let (response, _) = self.provider.complete(&system, &messages, &[]).await?;
        let text = response.as_concat_text();
        if text.trim().is_empty() {
            Ok(STEP_LIMIT_MESSAGE.to_string())
        } else {
            Ok(text)
        }
    }
}
