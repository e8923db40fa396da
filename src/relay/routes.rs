use super::state::AppState;
use super::ws;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Audio relay data plane
        .route("/ws", get(ws::ws_handler))
        // Request logging + browser clients
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
/// Liveness probe
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
