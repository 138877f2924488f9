//! Provider-specific interpretation of error bodies.
//!
//! Rate-limit delays and schema-validation failures are only reported inside
//! free-text error bodies, so the text matching lives here where it can be
//! swapped per provider and tested on its own.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// Padding added on top of a parsed retry hint.
pub const RETRY_HINT_BUFFER: Duration = Duration::from_millis(500);

static TRY_AGAIN_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)try again in\s+([0-9]+(?:\.[0-9]+)?)s").expect("invalid retry hint pattern")
});

/// Reads hints out of an inference provider's error bodies.
pub trait RetryHintParser: Send + Sync {
    /// Suggested wait before retrying, including any buffer.
    fn retry_after(&self, body: &str) -> Option<Duration>;

    /// Whether the body reports that structured output failed schema validation.
    fn is_schema_validation_failure(&self, body: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn parse_envelope(body: &str) -> Option<ErrorDetail> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error)
}

/// Hints in the OpenAI error envelope as emitted by Groq:
/// `{"error": {"message": "... Please try again in 2.5s ...", "code": "rate_limit_exceeded"}}`.
#[derive(Debug, Clone, Default)]
pub struct OpenAiErrorHints;

impl RetryHintParser for OpenAiErrorHints {
    fn retry_after(&self, body: &str) -> Option<Duration> {
        let message = parse_envelope(body)?.message?;
        let seconds: f64 = TRY_AGAIN_IN.captures(&message)?.get(1)?.as_str().parse().ok()?;
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        let millis = (seconds * 1000.0).ceil() as u64;
        Some(Duration::from_millis(millis) + RETRY_HINT_BUFFER)
    }

    fn is_schema_validation_failure(&self, body: &str) -> bool {
        parse_envelope(body)
            .and_then(|e| e.code)
            .is_some_and(|code| code == "json_validate_failed")
    }
}
