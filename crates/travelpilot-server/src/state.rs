use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use travelpilot::chat::ChatOrchestrator;
use travelpilot::session::SessionStore;

/// Shared by every request handler
pub struct AppState {
    pub chat: ChatOrchestrator,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Arc<AppState> {
        Arc::new(Self {
            chat: ChatOrchestrator::new(sessions.clone()),
            sessions,
        })
    }

    /// Periodically drop idle sessions, which also stops their tool servers
    pub fn spawn_session_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = sessions.evict_expired();
                if evicted > 0 {
                    debug!(evicted, remaining = sessions.len(), "Session sweep");
                }
            }
        })
    }
}
