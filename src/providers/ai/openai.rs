//! OpenAI-compatible provider implementation.
//!
//! Works with Groq, OpenAI, vLLM, LM Studio, Ollama's `/v1` endpoint and any
//! other server speaking the chat-completions protocol.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::retry_hint::{OpenAiErrorHints, RetryHintParser};
use super::traits::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider,
    LlmResult, ResponseFormat, Role, TokenUsage,
};

/// Default base URL for Groq's OpenAI-compatible API.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Chat-completions request body.
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for OpenAiMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: match msg.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: msg.content.clone(),
        }
    }
}

/// Chat-completions response body.
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    code: Option<String>,
}

/// Provider for OpenAI-compatible APIs.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    hints: Arc<dyn RetryHintParser>,
}

impl OpenAiCompatibleProvider {
    /// Creates a provider for Groq's API.
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::custom(GROQ_BASE_URL, Some(api_key.into()), model)
    }

    /// Creates a provider for a custom endpoint.
    pub fn custom(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            hints: Arc::new(OpenAiErrorHints),
        }
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Overrides how error bodies are interpreted.
    pub fn with_error_hints(mut self, hints: Arc<dyn RetryHintParser>) -> Self {
        self.hints = hints;
        self
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> OpenAiRequest<'a> {
        let mut messages: Vec<OpenAiMessage> = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system_prompt {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(OpenAiMessage::from));

        OpenAiRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            reasoning_effort: request.reasoning_effort.as_deref(),
            response_format: request.response_format.as_ref(),
        }
    }

    fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }

    /// Maps a non-2xx response onto an [`LlmError`].
    fn error_from_parts(
        &self,
        status: u16,
        retry_after_header: Option<&str>,
        body: String,
    ) -> LlmError {
        if status == 429 || status == 503 {
            let retry_after = self.hints.retry_after(&body).or_else(|| {
                retry_after_header
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
            });
            return LlmError::RateLimited {
                status,
                retry_after,
                body,
            };
        }

        let detail = serde_json::from_str::<OpenAiError>(&body).ok().map(|e| e.error);

        if self.hints.is_schema_validation_failure(&body) {
            let message = detail
                .map(|d| d.message)
                .unwrap_or_else(|| "json_validate_failed".to_string());
            return LlmError::SchemaValidation { message, body };
        }

        match detail {
            Some(d) if status == 401 || d.code.as_deref() == Some("invalid_api_key") => {
                LlmError::AuthenticationError(d.message)
            }
            Some(d) => LlmError::ApiError {
                status,
                message: d.message,
                body,
            },
            None => LlmError::ApiError {
                status,
                message: format!("HTTP {}", status),
                body,
            },
        }
    }

    fn parse_success_body(raw: String) -> LlmResult<CompletionResponse> {
        let api_response: OpenAiResponse = serde_json::from_str(&raw).map_err(|e| {
            LlmError::InvalidResponse(format!("Failed to parse response: {}; body: {}", e, raw))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse(format!("No choices in response: {}", raw)))?;

        let tokens_used = api_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
            tokens_used,
            finish_reason: Self::parse_finish_reason(choice.finish_reason.as_deref()),
            raw_body: raw,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(request);

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let raw = response.text().await?;

        if !status.is_success() {
            return Err(self.error_from_parts(status.as_u16(), retry_after.as_deref(), raw));
        }

        let parsed = Self::parse_success_body(raw)?;
        tracing::debug!(
            model = %self.model,
            total_tokens = parsed.tokens_used.total_tokens,
            "Completion received"
        );
        Ok(parsed)
    }
}
