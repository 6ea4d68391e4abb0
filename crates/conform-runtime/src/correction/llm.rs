//! LLM-backed correction service.
//!
//! The provider trait abstracts the chat completion backend; the service
//! turns a correction request into a prompt and the completion back into a
//! document.

use async_trait::async_trait;
use conform_core::Document;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{CorrectionError, CorrectionRequest, CorrectionResponse, CorrectionService};
use crate::prompts::{render_correction_prompt, CORRECTION_SYSTEM_PROMPT};
use crate::resilience::LlmUsage;

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<ProviderError> for CorrectionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::HttpError(msg) => CorrectionError::Network(msg),
            ProviderError::RateLimited { retry_after } => {
                CorrectionError::RateLimited { retry_after }
            }
            ProviderError::ApiError { status, message } if status >= 500 => {
                CorrectionError::Network(format!("{} - {}", status, message))
            }
            ProviderError::ApiError { status, message } => {
                CorrectionError::Rejected(format!("{} - {}", status, message))
            }
            ProviderError::ParseError(msg) => CorrectionError::Malformed(msg),
            ProviderError::AuthError => {
                CorrectionError::Unavailable("authentication failed".to_string())
            }
            ProviderError::Timeout(after) => CorrectionError::Timeout(after),
            ProviderError::NotConfigured(msg) => CorrectionError::Unavailable(msg),
        }
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic)
    pub temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4_000,
            temperature: 0.0,
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system" or "user"
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cache_read_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Chat completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is healthy. An unhealthy provider is not sent
    /// completions.
    async fn health_check(&self) -> bool;

    /// Get provider name for logs.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 chars per token
        (text.len() / 4) as u32
    }
}

/// Pull the outermost JSON object out of a completion.
///
/// Models sometimes wrap the object in prose or code fences.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (start < end).then(|| &content[start..=end])
}

/// Correction service backed by an LLM provider.
pub struct LlmCorrectionService {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    usage: RwLock<LlmUsage>,
}

impl LlmCorrectionService {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(provider, CompletionConfig::default())
    }

    pub fn with_config(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            provider,
            config,
            usage: RwLock::new(LlmUsage::default()),
        }
    }

    /// Token usage accumulated across all calls.
    pub fn usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    fn parse_completion(content: &str) -> Result<Document, CorrectionError> {
        let json = extract_json_object(content).ok_or_else(|| {
            CorrectionError::Malformed("completion contains no JSON object".to_string())
        })?;
        Document::from_json(json).map_err(|e| CorrectionError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CorrectionService for LlmCorrectionService {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn correct(
        &self,
        request: &CorrectionRequest,
    ) -> Result<CorrectionResponse, CorrectionError> {
        if !self.provider.health_check().await {
            return Err(CorrectionError::Unavailable(format!(
                "provider '{}' failed its health check",
                self.provider.name()
            )));
        }

        let prompt = render_correction_prompt(request);
        tracing::debug!(
            provider = self.provider.name(),
            attempt = request.attempt,
            estimated_tokens = self.provider.estimate_tokens(&prompt),
            "Requesting correction"
        );

        let messages = vec![
            ChatMessage::system(CORRECTION_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let response = self.provider.complete(messages, &self.config).await?;
        self.usage.write().add(&response.usage);

        if response.stop_reason.as_deref() == Some("max_tokens") {
            tracing::warn!(
                provider = self.provider.name(),
                "Completion truncated at max_tokens"
            );
        }

        Self::parse_completion(&response.content).map(CorrectionResponse::new)
    }
}
