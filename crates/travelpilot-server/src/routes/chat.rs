use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

#[tracing::instrument(name = "chat_request", skip_all)]
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .chat
        .handle(&request.message, request.session_id.as_deref())
        .await?;

    Ok(Json(ChatResponse {
        response: reply.response,
        session_id: reply.session_id,
    }))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(state)
}
