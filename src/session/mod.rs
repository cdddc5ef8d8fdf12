//! Voice session management
//!
//! This module provides the `VoiceSession` state machine that manages:
//! - Session lifecycle (idle, listening, processing, speaking, muted)
//! - Turn handling: final transcript, assistant request, spoken reply
//! - Barge-in when the user talks over the assistant
//! - Conversation history and the UI status contract

mod config;
mod history;
mod session;
mod status;

pub use config::SessionConfig;
pub use history::{ChatMessage, ConversationHistory, Role};
pub use session::VoiceSession;
pub use status::{SessionStatus, VoiceSnapshot};
