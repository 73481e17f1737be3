//! Language-model interface and an OpenAI-compatible chat client.
//!
//! The core only needs `invoke(prompt) -> content`. [`ChatClient`] speaks the
//! `/chat/completions` protocol used by DeepSeek, OpenAI and most local
//! servers; any other provider plugs in by implementing [`LanguageModel`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEEPSEEK_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
pub const DEEPSEEK_BASE_URL_ENV: &str = "DEEPSEEK_BASE_URL";
pub const CELLGRAPH_LLM_TIMEOUT_SECS_ENV: &str = "CELLGRAPH_LLM_TIMEOUT_SECS";

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for annotating cell types based on marker genes.";

/// Text returned by a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A synchronous language-model endpoint bound to one model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn invoke(&self, prompt: &str) -> Result<LlmResponse, LlmError>;

    /// Async entry point; delegates to the blocking [`invoke`](Self::invoke).
    async fn ainvoke(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        self.invoke(prompt)
    }
}

/// Hands out a [`LanguageModel`] for a model identifier.
pub trait ModelProvider {
    fn language_model(&self, model: &str) -> Box<dyn LanguageModel + '_>;
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub api_key: String,
    /// `None` disables the request timeout.
    pub timeout: Option<Duration>,
    pub system_prompt: String,
}

impl ChatClientConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Load from `DEEPSEEK_API_KEY`, `DEEPSEEK_BASE_URL` and
    /// `CELLGRAPH_LLM_TIMEOUT_SECS` (seconds, `0` disables).
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var(DEEPSEEK_API_KEY_ENV).unwrap_or_default();
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LlmError::Config(format!(
                "{DEEPSEEK_API_KEY_ENV} is not set (set it in your env; do not hardcode secrets in scripts)"
            )));
        }
        let base_url =
            std::env::var(DEEPSEEK_BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let mut config = Self::new(&base_url, api_key);
        if let Ok(raw) = std::env::var(CELLGRAPH_LLM_TIMEOUT_SECS_ENV) {
            config.timeout = parse_timeout_secs(&raw)?;
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        self.system_prompt = system_prompt.to_string();
        self
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let mut host = base_url.trim().to_string();
    if host.is_empty() {
        host = DEFAULT_BASE_URL.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("https://{host}");
    }
    host.trim_end_matches('/').to_string()
}

fn parse_timeout_secs(raw: &str) -> Result<Option<Duration>, LlmError> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        LlmError::Config(format!(
            "{CELLGRAPH_LLM_TIMEOUT_SECS_ENV} must be a whole number of seconds, got {raw:?}"
        ))
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

// ============================================================================
// Chat client
// ============================================================================

/// Chat-completions client with a blocking and an async transport.
///
/// The blocking client owns a private runtime, so it is only built on the
/// first blocking call; async callers never create it.
pub struct ChatClient {
    http: reqwest::Client,
    blocking: OnceLock<reqwest::blocking::Client>,
    config: ChatClientConfig,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(client_build_error)?;
        Ok(Self {
            http,
            blocking: OnceLock::new(),
            config,
        })
    }

    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(ChatClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    fn blocking_http(&self) -> Result<&reqwest::blocking::Client, LlmError> {
        if let Some(http) = self.blocking.get() {
            return Ok(http);
        }
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(client_build_error)?;
        Ok(self.blocking.get_or_init(|| http))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn request_body(&self, model: &str, prompt: &str) -> serde_json::Value {
        json!({
            "model": model,
            "stream": false,
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                { "role": "user", "content": prompt }
            ]
        })
    }

    /// One system + user exchange with `model`; returns the reply text.
    pub fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = self.completions_url();
        let resp = self
            .blocking_http()?
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(model, prompt))
            .send()
            .map_err(|e| LlmError::Network(format!("failed to reach {url}: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| LlmError::Network(format!("failed to read response body: {e}")))?;
        completion_text(status, text)
    }

    /// Async form of [`complete`](Self::complete).
    pub async fn complete_async(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = self.completions_url();
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(model, prompt))
            .send()
            .await
            .map_err(|e| LlmError::Network(format!("failed to reach {url}: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::Network(format!("failed to read response body: {e}")))?;
        completion_text(status, text)
    }
}

fn client_build_error(e: reqwest::Error) -> LlmError {
    LlmError::Config(format!("failed to build http client: {e}"))
}

fn completion_text(status: reqwest::StatusCode, body: String) -> Result<String, LlmError> {
    if !status.is_success() {
        return Err(LlmError::Api {
            status: status.as_u16(),
            body,
        });
    }
    parse_chat_completion(&body)
}

impl ModelProvider for ChatClient {
    fn language_model(&self, model: &str) -> Box<dyn LanguageModel + '_> {
        Box::new(ChatModel {
            client: self,
            model: model.to_string(),
        })
    }
}

/// A [`ChatClient`] bound to one model identifier.
pub struct ChatModel<'a> {
    client: &'a ChatClient,
    model: String,
}

#[async_trait]
impl<'a> LanguageModel for ChatModel<'a> {
    fn invoke(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "invoking chat model");
        let content = self.client.complete(&self.model, prompt)?;
        Ok(LlmResponse { content })
    }

    async fn ainvoke(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "invoking chat model (async)");
        let content = self.client.complete_async(&self.model, prompt).await?;
        Ok(LlmResponse { content })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Content of the first choice of a `/chat/completions` response body.
pub fn parse_chat_completion(body: &str) -> Result<String, LlmError> {
    let parsed: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("not a chat completion: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::InvalidResponse("response has no message content".to_string()))
}
