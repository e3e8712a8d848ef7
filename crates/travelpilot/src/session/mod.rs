mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::agents::Agent;

pub use store::{InMemorySessionStore, SessionStore, DEFAULT_SESSION_TTL};

/// One exchange of a conversation, replayed verbatim into later prompts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new<U: Into<String>, A: Into<String>>(user: U, assistant: A) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// A conversation and the agent that serves it.
///
/// The agent is created together with the session and reused for every
/// message sent to it. Turns are only ever appended.
pub struct Session {
    id: String,
    agent: Arc<dyn Agent>,
    turns: RwLock<Vec<Turn>>,
    turn_lock: Mutex<()>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, agent: Arc<dyn Agent>) -> Self {
        Self {
            id,
            agent,
            turns: RwLock::new(Vec::new()),
            turn_lock: Mutex::new(()),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent(&self) -> Arc<dyn Agent> {
        self.agent.clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Snapshot of the transcript, oldest turn first
    pub async fn history(&self) -> Vec<Turn> {
        self.turns.read().await.clone()
    }

    /// Serializes turns of this session. Hold the guard from reading the
    /// history until the new turn has been appended.
    pub async fn lock_turn(&self) -> MutexGuard<'_, ()> {
        self.turn_lock.lock().await
    }

    /// True while a turn holds the lock
    pub fn is_busy(&self) -> bool {
        self.turn_lock.try_lock().is_err()
    }

    pub(crate) async fn push_turn(&self, turn: Turn) {
        self.turns.write().await.push(turn);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
