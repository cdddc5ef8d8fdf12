use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    Muted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Listening => "listening",
            SessionStatus::Processing => "processing",
            SessionStatus::Speaking => "speaking",
            SessionStatus::Muted => "muted",
        };
        f.write_str(name)
    }
}

/// Everything the presentation layer may read about a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSnapshot {
    /// Whether a session is running (any status but idle)
    pub is_session_active: bool,

    /// Whether the recognizer is live
    pub is_listening: bool,

    /// Whether assistant audio is playing
    pub is_speaking: bool,

    /// Whether an assistant reply is pending
    pub is_processing: bool,

    /// Whether the user muted the microphone
    pub is_muted: bool,

    pub status: SessionStatus,

    /// Last failure, cleared when a new session starts
    pub error: Option<String>,

    /// Most recent transcript, partial or final
    pub last_transcription: String,
}
