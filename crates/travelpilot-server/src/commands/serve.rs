use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use travelpilot::agents::{AgentSettings, DefaultAgentFactory};
use travelpilot::config::Config;
use travelpilot::session::InMemorySessionStore;

use crate::configuration;
use crate::routes;
use crate::state::AppState;

pub async fn run() -> Result<()> {
    crate::logging::setup_logging(Some("travelpilotd"))?;

    let settings = configuration::Settings::new()?;
    let agent_settings = AgentSettings::from_config(Config::global())?;
    let factory = Arc::new(DefaultAgentFactory::new(agent_settings));

    let sessions = Arc::new(
        InMemorySessionStore::new(factory)
            .with_ttl(settings.session_ttl())
            .with_max_sessions(settings.max_sessions),
    );
    let state = AppState::new(sessions);
    let sweeper = state.spawn_session_sweeper(settings.sweep_interval());

    let app = routes::configure(state).layer(routes::cors(settings.cors_origins()?));

    let listener = tokio::net::TcpListener::bind(settings.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
