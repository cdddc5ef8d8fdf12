use super::state::AppState;
use crate::session::{ChatMessage, VoiceSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FrequencyResponse {
    /// 64 byte magnitudes, null when idle
    pub bins: Option<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
    pub active_agent: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/session/start
/// Start listening for the user
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested over HTTP");

    if let Err(e) = state.session.start_session().await {
        error!("Failed to start session: {}", e);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: format!("Failed to start session: {}", e),
            }),
        )
            .into_response();
    }

    (StatusCode::OK, Json(state.session.snapshot())).into_response()
}

/// POST /voice/session/stop
pub async fn stop_session(State(state): State<AppState>) -> Json<VoiceSnapshot> {
    info!("Stop requested over HTTP");
    state.session.stop_session().await;
    Json(state.session.snapshot())
}

/// POST /voice/session/toggle
pub async fn toggle_session(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.session.toggle_session().await {
        error!("Failed to toggle session: {}", e);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: format!("Failed to start session: {}", e),
            }),
        )
            .into_response();
    }

    (StatusCode::OK, Json(state.session.snapshot())).into_response()
}

/// POST /voice/mute/toggle
pub async fn toggle_mute(State(state): State<AppState>) -> Json<VoiceSnapshot> {
    state.session.toggle_mute().await;
    Json(state.session.snapshot())
}

/// GET /voice/status
pub async fn get_status(State(state): State<AppState>) -> Json<VoiceSnapshot> {
    Json(state.session.snapshot())
}

/// GET /voice/frequency
/// Sampled by the visualizer on every frame
pub async fn get_frequency_data(State(state): State<AppState>) -> Json<FrequencyResponse> {
    Json(FrequencyResponse {
        bins: state.session.get_frequency_data(),
    })
}

/// GET /voice/history
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        messages: state.history.messages(),
        active_agent: state.history.active_agent(),
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
