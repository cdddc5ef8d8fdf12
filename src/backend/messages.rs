use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Assistant reply returned by the chat endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub text: String,
    /// Opaque identifier of the agent that produced the reply
    #[serde(default)]
    pub agent: Option<String>,
}

/// Short-lived speech service credential from `GET /api/speech-token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechToken {
    pub token: String,
    pub region: String,
}
