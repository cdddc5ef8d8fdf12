//! Assistant backend collaborators
//!
//! - `POST /api/chat` - assistant reply for a user utterance
//! - `GET /api/speech-token` - short-lived speech service credential

pub mod client;
pub mod messages;
pub mod token;

pub use client::{AssistantApi, BackendClient, SpeechTokenSource};
pub use messages::{AssistantReply, ChatRequest, SpeechToken};
pub use token::{TokenCache, DEFAULT_TOKEN_VALIDITY};
