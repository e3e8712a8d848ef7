use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Session, SessionError, Turn};
use crate::agents::{AgentError, AgentFactory};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Keeps the live sessions of the process
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the session for `id`, or start a new one under a fresh id when
    /// `id` is absent, unknown or expired. Nothing is stored if the agent
    /// for a new session cannot be created.
    async fn get_or_create(&self, id: Option<&str>) -> Result<Arc<Session>, AgentError>;

    async fn append_turn(&self, id: &str, turn: Turn) -> Result<(), SessionError>;

    fn get(&self, id: &str) -> Option<Arc<Session>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every idle session past the TTL, returning how many went
    fn evict_expired(&self) -> usize;
}

struct Entry {
    session: Arc<Session>,
    last_active: Instant,
}

/// Process-local store. Sessions expire after `ttl` without activity and,
/// when `max_sessions` is set, the least recently active session is evicted
/// to make room for a new one. A session in the middle of a turn is never
/// evicted.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Entry>,
    factory: Arc<dyn AgentFactory>,
    ttl: Option<Duration>,
    max_sessions: Option<usize>,
}

impl InMemorySessionStore {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            sessions: DashMap::new(),
            factory,
            ttl: Some(DEFAULT_SESSION_TTL),
            max_sessions: None,
        }
    }

    /// `None` keeps sessions for the lifetime of the process
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: Option<usize>) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    fn is_expired(&self, last_active: Instant) -> bool {
        self.ttl
            .map(|ttl| last_active.elapsed() > ttl)
            .unwrap_or(false)
    }

    /// Refresh and return a live session, removing it if it has expired
    fn touch(&self, id: &str) -> Option<Arc<Session>> {
        let mut entry = self.sessions.get_mut(id)?;
        if self.is_expired(entry.last_active) && !entry.session.is_busy() {
            drop(entry);
            self.sessions.remove_if(id, |_, entry| {
                self.is_expired(entry.last_active) && !entry.session.is_busy()
            });
            debug!(session_id = %id, "Session expired");
            return None;
        }
        entry.last_active = Instant::now();
        Some(entry.session.clone())
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    fn enforce_capacity(&self, keep: &str) {
        let Some(max) = self.max_sessions else {
            return;
        };
        while self.sessions.len() > max {
            let oldest = self
                .sessions
                .iter()
                .filter(|entry| entry.key() != keep && !entry.session.is_busy())
                .min_by_key(|entry| entry.last_active)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                    info!(session_id = %id, "Evicted least recently active session");
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, id: Option<&str>) -> Result<Arc<Session>, AgentError> {
        if let Some(session) = id.and_then(|id| self.touch(id)) {
            return Ok(session);
        }

        let agent = self.factory.create().await?;
        let id = self.fresh_id();
        let session = Arc::new(Session::new(id.clone(), agent));
        self.sessions.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                last_active: Instant::now(),
            },
        );
        self.enforce_capacity(&id);
        info!(session_id = %id, active = self.sessions.len(), "Session created");

        Ok(session)
    }

    async fn append_turn(&self, id: &str, turn: Turn) -> Result<(), SessionError> {
        let session = match self.sessions.get_mut(id) {
            Some(mut entry) => {
                entry.last_active = Instant::now();
                entry.session.clone()
            }
            None => return Err(SessionError::NotFound(id.to_string())),
        };
        session.push_turn(turn).await;
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(id)
            .filter(|entry| !self.is_expired(entry.last_active))
            .map(|entry| entry.session.clone())
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }

    fn evict_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| self.is_expired(entry.last_active) && !entry.session.is_busy())
            .map(|entry| entry.key().clone())
            .collect();

        let evicted = expired
            .iter()
            .filter(|id| {
                self.sessions
                    .remove_if(id.as_str(), |_, entry| {
                        self.is_expired(entry.last_active) && !entry.session.is_busy()
                    })
                    .is_some()
            })
            .count();
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }
}
