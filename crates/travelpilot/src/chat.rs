use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::agents::AgentError;
use crate::session::{SessionStore, Turn};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Failed to initialize agent: {0}")]
    AgentInitialization(#[source] AgentError),

    #[error("Agent execution failed: {0}")]
    AgentExecution(#[source] AgentError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
}

/// Render the prompt for `message`, replaying earlier turns ahead of it
pub fn render_prompt(history: &[Turn], message: &str) -> String {
    if history.is_empty() {
        return message.to_string();
    }

    let mut prompt = String::from("Previous conversation history:\n");
    for turn in history {
        prompt.push_str(&format!("User: {}\nAI: {}\n", turn.user, turn.assistant));
    }
    prompt.push_str(
        "\nInstructions: Use the history above to understand context. Answer the Current User Request below.\n",
    );
    prompt.push_str(&format!("Current User Request: {}", message));
    prompt
}

/// Runs one chat message against the session it belongs to
pub struct ChatOrchestrator {
    sessions: Arc<dyn SessionStore>,
}

impl ChatOrchestrator {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    #[instrument(skip(self, message), fields(message_len = message.len()))]
    pub async fn handle(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<ChatReply, ChatError> {
        let session = self
            .sessions
            .get_or_create(session_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Agent initialization failed");
                ChatError::AgentInitialization(e)
            })?;

        let _turn = session.lock_turn().await;
        let history = session.history().await;
        let prompt = render_prompt(&history, message);

        let response = session.agent().run(&prompt).await.map_err(|e| {
            error!(session_id = %session.id(), error = %e, "Agent run failed");
            ChatError::AgentExecution(e)
        })?;

        let turn = Turn::new(message, response.clone());
        if let Err(e) = self.sessions.append_turn(session.id(), turn.clone()).await {
            // evicted while the agent ran; the answer still belongs to this session
            warn!(session_id = %session.id(), error = %e, "Session left the store mid-turn");
            session.push_turn(turn).await;
        }
        info!(session_id = %session.id(), turns = history.len() + 1, "Chat turn completed");

        Ok(ChatReply {
            response,
            session_id: session.id().to_string(),
        })
    }
}
