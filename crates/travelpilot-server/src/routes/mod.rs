pub mod chat;
pub mod health;

use std::sync::Arc;

use axum::Router;
use http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::state::AppState;

/// Configure all routes
pub fn configure(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(chat::routes(state))
}

/// Only the listed origins, with credentials. Methods and headers are
/// mirrored from the preflight request.
pub fn cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}
