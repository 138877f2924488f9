//! AI/LLM provider implementations.
//!
//! A single OpenAI-compatible client covers Groq (the default), OpenAI and
//! self-hosted endpoints. Error-body interpretation is pluggable through
//! [`RetryHintParser`].
//!
//! # Example
//!
//! ```rust,no_run
//! use rejection_sorter::providers::ai::{
//!     ChatMessage, CompletionRequest, LlmProvider, OpenAiCompatibleProvider,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let groq = OpenAiCompatibleProvider::groq("gsk_...", "openai/gpt-oss-20b");
//!
//! let request = CompletionRequest::new(vec![ChatMessage::user("Hello!")])
//!     .with_system_prompt("Reply with a JSON object.");
//!
//! let response = groq.complete(&request).await?;
//! println!("Response: {}", response.text);
//! # Ok(())
//! # }
//! ```

mod openai;
mod retry_hint;
mod traits;

pub use openai::{OpenAiCompatibleProvider, GROQ_BASE_URL};
pub use retry_hint::{OpenAiErrorHints, RetryHintParser, RETRY_HINT_BUFFER};
pub use traits::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, JsonSchemaFormat, LlmError,
    LlmProvider, LlmResult, ResponseFormat, Role, TokenUsage,
};
