use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/voice/session/start", post(handlers::start_session))
        .route("/voice/session/stop", post(handlers::stop_session))
        .route("/voice/session/toggle", post(handlers::toggle_session))
        .route("/voice/mute/toggle", post(handlers::toggle_mute))
        // Read-only state for the presentation layer
        .route("/voice/status", get(handlers::get_status))
        .route("/voice/frequency", get(handlers::get_frequency_data))
        .route("/voice/history", get(handlers::get_history))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
