mod gemini;
mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{env_parse, env_string};

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Request for a single completion
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The user prompt
    pub prompt: String,
    /// Optional system instruction
    pub system: Option<String>,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the provider for a bare JSON object
    pub json_response: bool,
    /// Timeout for the request
    pub timeout: Duration,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "gemini", "openai")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("Unknown grader provider '{}'", other)),
        }
    }
}

/// Configuration for the grading model
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    /// Google Generative AI key
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Hard timeout for one grading attempt
    pub timeout: Duration,
    /// Attempts per test case, including the first
    pub max_attempts: u32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(12),
            max_attempts: 3,
            max_tokens: 256,
        }
    }
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let provider = match env_string("GRADER_PROVIDER") {
            Some(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, falling back to gemini", e);
                ProviderKind::Gemini
            }),
            None => defaults.provider,
        };

        Self {
            provider,
            gemini_api_key: env_string("GOOGLE_GENERATIVE_AI_API_KEY")
                .or_else(|| env_string("GOOGLE_API_KEY")),
            gemini_model: env_string("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: env_string("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            openai_api_key: env_string("OPENAI_API_KEY"),
            openai_model: env_string("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            timeout: env_parse("GRADER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_attempts: env_parse::<u32>("GRADER_MAX_ATTEMPTS")
                .map(|n| n.max(1))
                .unwrap_or(defaults.max_attempts),
            max_tokens: env_parse("GRADER_MAX_TOKENS").unwrap_or(defaults.max_tokens),
        }
    }

    /// Build the configured provider, failing if its credentials are missing
    pub fn build_provider(&self) -> LlmResult<Arc<dyn LlmProvider>> {
        match self.provider {
            ProviderKind::Gemini => {
                let api_key = self.gemini_api_key.clone().ok_or_else(|| {
                    LlmError::MissingCredentials(
                        "GOOGLE_GENERATIVE_AI_API_KEY is not set (or GOOGLE_API_KEY fallback)"
                            .to_string(),
                    )
                })?;
                Ok(Arc::new(GeminiProvider::new(
                    api_key,
                    self.gemini_model.clone(),
                    self.gemini_base_url.clone(),
                )))
            }
            ProviderKind::OpenAi => {
                let api_key = self.openai_api_key.clone().ok_or_else(|| {
                    LlmError::MissingCredentials("OPENAI_API_KEY is not set".to_string())
                })?;
                Ok(Arc::new(OpenAiProvider::new(
                    api_key,
                    self.openai_model.clone(),
                )))
            }
        }
    }
}
