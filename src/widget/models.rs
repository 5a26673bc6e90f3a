use crate::llm::{ChatMessage, HistoryRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const GREETING: &str = "Hi! I'm the Fit2Recover AI assistant. How can I help you today?";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
}

impl Role {
    /// The endpoint only knows user and model turns; system notes travel as model.
    pub fn history_role(self) -> HistoryRole {
        match self {
            Role::User => HistoryRole::User,
            Role::Model => HistoryRole::Model,
            Role::System => HistoryRole::Model,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to_history(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.history_role(),
            content: self.content.clone(),
        }
    }
}

/// Outbound history for the endpoint: roles folded, ids and timestamps
/// dropped. Empty turns are skipped; the model API rejects empty text parts.
pub fn history_payload(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(Message::to_history)
        .collect()
}
