use crate::backend::DEFAULT_TOKEN_VALIDITY;
use crate::transport::TransportConfig;
use std::time::Duration;

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "voice-6f1c...")
    pub session_id: String,

    /// Recognition language, synthesis voice and playback timeouts
    pub transport: TransportConfig,

    /// How long a fetched speech token is reused
    /// Default: 9 minutes (1 minute under the 10 minute server validity)
    pub token_validity: Duration,

    /// Final transcripts that may wait while a turn is in flight.
    /// Further transcripts are dropped.
    pub max_pending_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("voice-{}", uuid::Uuid::new_v4()),
            transport: TransportConfig::default(),
            token_validity: DEFAULT_TOKEN_VALIDITY,
            max_pending_turns: 2,
        }
    }
}
