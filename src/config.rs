use crate::llm::gemini::{GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8888";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Process configuration for the chat endpoint.
///
/// The API key stays optional: a server without one still answers, every chat
/// call just fails with a configuration error.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini: GeminiConfig,
    pub bind_addr: SocketAddr,
}

impl Settings {
    /// Read settings from the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = value("CHAT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "CHAT_BIND_ADDR",
                message: e.to_string(),
            })?;

        Ok(Self {
            gemini_api_key: value("GEMINI_API_KEY"),
            gemini: GeminiConfig {
                base_url: value("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                model: value("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
            bind_addr,
        })
    }
}
