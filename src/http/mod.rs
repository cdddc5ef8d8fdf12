//! HTTP API server for the presentation layer
//!
//! This module exposes the voice session's status contract over REST:
//! - POST /voice/session/start - Start listening
//! - POST /voice/session/stop - Stop the session
//! - POST /voice/session/toggle - Start or stop
//! - POST /voice/mute/toggle - Mute or unmute the microphone
//! - GET /voice/status - Session snapshot
//! - GET /voice/frequency - Visualizer bins
//! - GET /voice/history - Conversation so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, FrequencyResponse, HistoryResponse};
pub use routes::create_router;
pub use state::AppState;
