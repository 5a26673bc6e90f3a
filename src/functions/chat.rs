use crate::llm::{ChatMessage, ChatProvider, ChatRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SYSTEM_INSTRUCTION: &str = "You are the empathetic, helpful, and knowledgeable AI Assistant for Fit2Recover (fit2recover.org), a nonprofit recovery community center in Utah.

Key Context:
- Mission: To provide a safe place for people in recovery to connect through Fitness, Nutrition, Creative Arts, and Community Service.
- Locations: Salt Lake City (Main & Annex), Provo, Park City, Heber City.
- Core Values: Connection, Support, Empowerment, Service.

Tone: Warm, encouraging, non-judgmental, professional but accessible.

Guidelines:
- Briefly answer questions about schedules, programs, and locations.
- If someone asks about specific medical advice or crisis support, gently direct them to professional medical services or crisis hotlines (988), but mention Fit2Recover is a supportive community.
- Keep responses concise (under 150 words usually).
- Use \"We\" when referring to the organization.";

pub const TEMPERATURE: f32 = 0.7;

const CORS_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "Content-Type"),
    ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ("Content-Type", "application/json"),
];

/// What the function gateway hands the handler.
#[derive(Debug, Clone, Default)]
pub struct FunctionEvent {
    pub http_method: String,
    pub body: Option<String>,
}

impl FunctionEvent {
    pub fn new(http_method: impl Into<String>, body: Option<String>) -> Self {
        Self {
            http_method: http_method.into(),
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: String,
}

impl FunctionResponse {
    fn new(status_code: u16, body: String) -> Self {
        Self {
            status_code,
            headers: CORS_HEADERS.to_vec(),
            body,
        }
    }

    fn json(status_code: u16, reply: &ChatReply) -> Self {
        // ChatReply only holds strings, so serialization cannot fail.
        let body = serde_json::to_string(reply).unwrap_or_default();
        Self::new(status_code, body)
    }

    /// Error envelope for requests turned away before reaching the handler.
    pub fn failure(status_code: u16, error: &str, detail: Option<String>) -> Self {
        Self::json(
            status_code,
            &ChatReply::Failure {
                error: error.to_string(),
                detail,
            },
        )
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChatEnvelope {
    #[serde(default)]
    history: Option<Vec<ChatMessage>>,
    #[serde(default)]
    user_message: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ChatReply {
    Success {
        response: String,
    },
    Failure {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ChatReply {
    fn error(error: &str) -> Self {
        ChatReply::Failure {
            error: error.to_string(),
            detail: None,
        }
    }

    fn error_with_detail(error: &str, detail: String) -> Self {
        ChatReply::Failure {
            error: error.to_string(),
            detail: Some(detail),
        }
    }
}

/// Serverless chat function. Stateless: every call runs a fresh session.
pub struct ChatHandler {
    api_key: Option<String>,
    provider: Arc<dyn ChatProvider>,
}

impl ChatHandler {
    pub fn new(api_key: Option<String>, provider: Arc<dyn ChatProvider>) -> Self {
        Self { api_key, provider }
    }

    pub async fn handle(&self, event: FunctionEvent) -> FunctionResponse {
        let method = event.http_method.to_ascii_uppercase();

        if method == "OPTIONS" {
            return FunctionResponse::new(204, String::new());
        }

        if method != "POST" {
            return FunctionResponse::json(405, &ChatReply::error("Method not allowed"));
        }

        let raw = event
            .body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or("{}");
        let envelope: ChatEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting malformed chat body");
                return FunctionResponse::json(
                    400,
                    &ChatReply::error_with_detail("Invalid request body", e.to_string()),
                );
            }
        };

        let Some(user_message) = envelope.user_message.filter(|m| !m.is_empty()) else {
            return FunctionResponse::json(
                400,
                &ChatReply::error("Missing 'userMessage' in request body"),
            );
        };

        let Some(api_key) = self.api_key.as_deref() else {
            tracing::error!("chat requested but GEMINI_API_KEY is not set");
            return FunctionResponse::json(
                500,
                &ChatReply::error("GEMINI_API_KEY is not configured on the server"),
            );
        };

        let request = ChatRequest {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history: envelope.history.unwrap_or_default(),
            message: user_message,
            temperature: TEMPERATURE,
        };

        match self.provider.chat(api_key, &request).await {
            Ok(reply) => {
                tracing::info!(
                    model = %reply.model,
                    turns = request.history.len(),
                    chars = reply.content.len(),
                    "chat reply ready"
                );
                FunctionResponse::json(
                    200,
                    &ChatReply::Success {
                        response: reply.content,
                    },
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "model provider call failed");
                FunctionResponse::json(
                    500,
                    &ChatReply::error_with_detail("Failed to get AI response", e.to_string()),
                )
            }
        }
    }
}
