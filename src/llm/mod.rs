pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::error::Error;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    AuthenticationError(String),
    QuotaError(String),
    ResponseError(String),
    ConfigError(String),
}

impl LlmError {
    /// Maps a non-success HTTP status from a provider onto the error taxonomy.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let msg = if body.trim().is_empty() {
            format!("{} API responded with status code: {}", provider, status)
        } else {
            format!("{} API responded with status code: {} - {}", provider, status, body.trim())
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthenticationError(msg),
            StatusCode::TOO_MANY_REQUESTS => LlmError::QuotaError(msg),
            _ => LlmError::ResponseError(msg),
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::AuthenticationError(msg) => write!(f, "LLM authentication error: {}", msg),
            LlmError::QuotaError(msg) => write!(f, "LLM quota error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// A text-generation backend. Implementations send the instruction and the
/// question as generation context and hand back the raw completion text.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, question: &str, instruction: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Box<dyn SqlGenerator + Send + Sync>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Box<dyn SqlGenerator + Send + Sync> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            "openai" | "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        info!("Using {} backend with model {}", config.backend, config.model);
        Ok(Self { generator })
    }

    pub fn with_generator(generator: Box<dyn SqlGenerator + Send + Sync>) -> Self {
        Self { generator }
    }

    /// Single shot: the completion is trimmed and returned as-is. An empty
    /// completion counts as a failed translation.
    pub async fn translate(&self, question: &str, instruction: &str) -> Result<String, LlmError> {
        let raw = self.generator.generate_sql(question, instruction).await?;
        let sql = raw.trim();

        if sql.is_empty() {
            return Err(LlmError::ResponseError("Model returned an empty completion".to_string()));
        }

        debug!("Generated SQL: {}", sql);
        Ok(sql.to_string())
    }
}
