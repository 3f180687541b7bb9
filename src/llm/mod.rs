//! LLM service client for structured output
//!
//! Both agents talk to the model through [`LlmService`]: a system
//! instruction, a user payload and a JSON schema go in, raw content and token
//! usage come out. [`LlmClient`] implements it for two backends:
//!
//! - OpenAI-compatible `/v1/chat/completions` with `response_format: json_schema`
//! - Ollama `/api/chat` with `format: <schema>`
//!
//! Calls are rate limited with governor and retried with exponential backoff
//! on transient failures only (timeouts, connection errors, 429 and 5xx).

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

use crate::utils::retry::{with_retry_if, RetryConfig};

/// Errors returned by the LLM service
#[derive(Error, Debug)]
pub enum LlmError {
    /// Request timed out
    #[error("LLM request timed out")]
    Timeout,

    /// Could not reach the endpoint
    #[error("Failed to connect to LLM endpoint: {0}")]
    Connection(String),

    /// Non-success HTTP status
    #[error("LLM request failed: {status} - {body}")]
    Status { status: u16, body: String },

    /// Transport-level failure not covered above
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// Response body could not be decoded
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    /// Model returned no content
    #[error("LLM response is empty")]
    EmptyResponse,

    /// Client could not be built from its configuration
    #[error("Invalid LLM configuration: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Http(_)
            | Self::MalformedResponse(_)
            | Self::EmptyResponse
            | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Wire protocol spoken by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// OpenAI-compatible chat completions (OpenAI, vLLM, LM Studio, ...)
    #[default]
    #[serde(alias = "vllm")]
    OpenAi,
    /// Ollama native chat API
    Ollama,
}

impl std::str::FromStr for LlmBackend {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "vllm" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(LlmError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Configuration for LLM client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend protocol
    pub backend: LlmBackend,

    /// Base URL (default: https://api.openai.com)
    pub endpoint: String,

    /// Bearer token, sent only when set
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens to generate (backend default when unset)
    pub max_tokens: Option<u32>,

    /// Sampling temperature, pinned low for reproducible output
    pub temperature: f32,

    /// Request budget per minute
    pub requests_per_minute: u32,

    /// Backoff for transient failures
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::OpenAi,
            endpoint: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            max_tokens: None,
            temperature: 0.0,
            requests_per_minute: 60,
            retry: RetryConfig::with_delays(3, 2000, 30_000),
        }
    }
}

impl LlmConfig {
    /// Create config from environment variables, starting from defaults
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `ONTOGRAPH_LLM_*` / `OPENAI_API_KEY` overrides on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(backend) = std::env::var("ONTOGRAPH_LLM_BACKEND")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.backend = backend;
        }
        if let Ok(endpoint) = std::env::var("ONTOGRAPH_LLM_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("ONTOGRAPH_LLM_MODEL") {
            self.model = model;
        }
        if let Ok(key) =
            std::env::var("ONTOGRAPH_LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            self.api_key = Some(key);
        }
        self.timeout_secs = std::env::var("ONTOGRAPH_LLM_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.timeout_secs);
        self.temperature = std::env::var("ONTOGRAPH_LLM_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.temperature);
        self.requests_per_minute = std::env::var("ONTOGRAPH_LLM_RPM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.requests_per_minute);
        if let Some(max_tokens) = std::env::var("ONTOGRAPH_LLM_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.max_tokens = Some(max_tokens);
        }
        self
    }
}

/// One structured-output call
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// System instruction
    pub system: String,

    /// User payload (document text and context)
    pub user: String,

    /// Name of the response shape, forwarded to backends that require one
    pub schema_name: String,

    /// JSON schema the response must conform to
    pub json_schema: serde_json::Value,
}

/// Raw model output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredResponse {
    pub content: String,
    pub total_tokens: u64,
}

/// Structured-output LLM endpoint
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete_structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<StructuredResponse, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'a serde_json::Value,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// HTTP client for an LLM endpoint
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl LlmClient {
    /// Create a new LLM client with custom config
    pub fn with_config(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(format!("failed to create HTTP client: {e}")))?;

        let rate = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(rate));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Create a client from environment variables
    pub fn from_env() -> Result<Self, LlmError> {
        Self::with_config(LlmConfig::from_env())
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn backend(&self) -> LlmBackend {
        self.config.backend
    }

    async fn send_once(&self, request: &StructuredRequest) -> Result<StructuredResponse, LlmError> {
        self.rate_limiter.until_ready().await;

        let messages = vec![
            ChatMessage {
                role: "system",
                content: &request.system,
            },
            ChatMessage {
                role: "user",
                content: &request.user,
            },
        ];

        let endpoint = self.config.endpoint.trim_end_matches('/');
        let builder = match self.config.backend {
            LlmBackend::OpenAi => {
                let body = OpenAiRequest {
                    model: &self.config.model,
                    messages,
                    temperature: self.config.temperature,
                    max_tokens: self.config.max_tokens,
                    response_format: serde_json::json!({
                        "type": "json_schema",
                        "json_schema": {
                            "name": request.schema_name,
                            "schema": request.json_schema,
                        }
                    }),
                };
                self.client
                    .post(format!("{endpoint}/v1/chat/completions"))
                    .json(&body)
            }
            LlmBackend::Ollama => {
                let body = OllamaRequest {
                    model: &self.config.model,
                    messages,
                    stream: false,
                    format: &request.json_schema,
                    options: OllamaOptions {
                        temperature: self.config.temperature,
                        num_predict: self.config.max_tokens,
                    },
                };
                self.client.post(format!("{endpoint}/api/chat")).json(&body)
            }
        };

        let builder = match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        };

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let (content, total_tokens) = match self.config.backend {
            LlmBackend::OpenAi => {
                let parsed: OpenAiResponse = response.json().await?;
                let content = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                (content, parsed.usage.map(|u| u.total_tokens).unwrap_or(0))
            }
            LlmBackend::Ollama => {
                let parsed: OllamaResponse = response.json().await?;
                (
                    parsed.message.content,
                    parsed.prompt_eval_count + parsed.eval_count,
                )
            }
        };

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(StructuredResponse {
            content,
            total_tokens,
        })
    }
}

#[async_trait]
impl LlmService for LlmClient {
    async fn complete_structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<StructuredResponse, LlmError> {
        let response = with_retry_if(
            &self.config.retry,
            || self.send_once(request),
            LlmError::is_transient,
        )
        .await?;

        tracing::debug!(
            schema = %request.schema_name,
            tokens = response.total_tokens,
            "LLM call completed"
        );

        Ok(response)
    }
}

/// Extract the JSON payload from model output.
///
/// Accepts bare JSON, JSON wrapped in a markdown code fence, or JSON
/// surrounded by prose (the outermost `{...}` is taken).
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let after_start = &text[start + 3..];
        let content_start = after_start.find('\n').map_or(0, |i| i + 1);
        if let Some(end) = after_start[content_start..].find("```") {
            return after_start[content_start..content_start + end].trim();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            return &text[start..=end];
        }
    }

    text.trim()
}
