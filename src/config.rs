//! Environment-driven configuration

use crate::llm::DeliveryMode;
use std::path::PathBuf;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Process configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Credential for the completion backend, supplied out-of-band
    pub anthropic_api_key: Option<String>,
    /// Gateway override, e.g. an internal proxy in front of the provider
    pub base_url: Option<String>,
    pub model: String,
    pub port: u16,
    pub max_tokens: u32,
    /// Whether replies are streamed word-by-word or delivered whole
    pub delivery: DeliveryMode,
    /// File overriding the built-in system instruction
    pub instruction_path: Option<PathBuf>,
    /// Override for the canned session greeting
    pub greeting: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            base_url: std::env::var("FOH_BASE_URL").ok(),
            model: std::env::var("FOH_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            port: std::env::var("FOH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            max_tokens: std::env::var("FOH_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
            delivery: match std::env::var("FOH_STREAMING").ok().as_deref() {
                Some("0" | "false" | "off") => DeliveryMode::Atomic,
                _ => DeliveryMode::Streaming,
            },
            instruction_path: std::env::var("FOH_INSTRUCTION_PATH").ok().map(PathBuf::from),
            greeting: std::env::var("FOH_GREETING").ok(),
        }
    }
}
