pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// Speaker of a history turn as the chat endpoint accepts it.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    #[default]
    User,
    Model,
}

/// Anything other than `"model"`, including null, reads as a user turn.
impl<'de> Deserialize<'de> for HistoryRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let role = Option::<String>::deserialize(deserializer)?;
        Ok(match role.as_deref() {
            Some("model") => HistoryRole::Model,
            _ => HistoryRole::User,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: HistoryRole,
    pub content: String,
}

/// One conversational turn: a fresh session seeded with `system_instruction`
/// and `history`, then `message` sent as the next user turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_instruction: String,
    pub history: Vec<ChatMessage>,
    pub message: String,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

/// A hosted model that answers a single turn.
///
/// The credential is handed in per call so a provider never owns a secret
/// longer than the request that needs it.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}
