//! Conversation transcript shared with the presentation layer

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Agent that produced an assistant message
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct HistoryInner {
    messages: Vec<ChatMessage>,
    active_agent: Option<String>,
}

/// Append-only message log plus the agent currently answering
#[derive(Debug, Default)]
pub struct ConversationHistory {
    inner: RwLock<HistoryInner>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, role: Role, content: impl Into<String>, agent: Option<String>) -> ChatMessage {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            agent,
            timestamp: Utc::now(),
        };
        self.inner.write().messages.push(message.clone());
        message
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.read().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().messages.is_empty()
    }

    pub fn active_agent(&self) -> Option<String> {
        self.inner.read().active_agent.clone()
    }

    pub fn set_active_agent(&self, agent: Option<String>) {
        self.inner.write().active_agent = agent;
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.messages.clear();
        inner.active_agent = None;
    }
}
