use crate::session::{ConversationHistory, VoiceSession};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The voice session driven by this server
    pub session: VoiceSession,

    /// Conversation shown by the presentation layer
    pub history: Arc<ConversationHistory>,
}

impl AppState {
    pub fn new(session: VoiceSession) -> Self {
        let history = Arc::clone(session.history());
        Self { session, history }
    }
}
