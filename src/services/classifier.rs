//! Candidate classification.
//!
//! [`LlmClassifier`] sends candidates to an OpenAI-compatible endpoint with a
//! strict JSON schema. Rate limits are waited out in place; a batch whose
//! output fails schema validation is halved until it passes or a single
//! item is left. [`KeywordClassifier`] is the inference-free alternative.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{ClassifierSettings, InferenceSettings};
use crate::domain::{Candidate, ClassificationResult, Verdict};
use crate::providers::ai::{
    ChatMessage, CompletionRequest, CompletionResponse, JsonSchemaFormat, LlmError, LlmProvider,
    ResponseFormat,
};

/// Name of the structured-output schema sent with every request.
pub const SCHEMA_NAME: &str = "job_rejection_classifier";

const SYSTEM_PROMPT: &str = "You classify emails.
Return ONLY JSON that matches the provided schema.

Return verdict REJECT only if BOTH are true:
1) The email is about a job/internship application for the recipient.
2) It clearly indicates rejection / non-advancement.

Marketing/promotions/newsletters/game updates must be OTHER.";

const USER_PROMPT_HEADER: &str = "Classify each item. Keep confidence between 0 and 1.
Do not include markdown or code fences.

ITEMS:
";

/// Errors that can occur during classification.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Non-retryable inference failure (HTTP, auth, unexpected status).
    #[error("inference failed: {0}")]
    Llm(#[from] LlmError),

    /// Schema validation still failed once the batch could not be split further.
    #[error("schema validation failed for a batch of {batch_size}: {message}")]
    SchemaValidation { batch_size: usize, message: String },

    /// The model output could not be read as JSON at all.
    #[error("malformed classifier response")]
    MalformedResponse { raw: String },

    #[error("still rate limited after {retries} retries")]
    RateLimitRetriesExhausted { retries: u32 },

    #[error("batch split depth {depth} exceeded")]
    SplitDepthExceeded { depth: usize },

    #[error("no rejection phrases configured")]
    NoPhrases,

    #[error("invalid rejection phrase pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to encode prompt items: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for classification.
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Assigns a verdict to each candidate.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies one batch.
    ///
    /// Returns exactly one result per candidate, in input order. Candidates
    /// the classifier said nothing about come back as
    /// [`ClassificationResult::omitted`].
    async fn classify(&self, batch: &[Candidate]) -> Result<Vec<ClassificationResult>>;

    /// Pause the caller should leave between consecutive batches.
    fn batch_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// What came back for one request.
#[derive(Debug)]
enum BatchOutcome {
    Classified(Vec<ClassificationResult>),
    SchemaFailure(String),
}

#[derive(Serialize)]
struct PromptItem<'a> {
    id: &'a str,
    subject: &'a str,
    snippet: &'a str,
}

#[derive(Deserialize)]
struct RawResult {
    id: String,
    verdict: String,
    confidence: f64,
}

/// Classifier backed by an [`LlmProvider`].
pub struct LlmClassifier<P: LlmProvider + ?Sized> {
    provider: Arc<P>,
    settings: ClassifierSettings,
    max_completion_tokens: usize,
    reasoning_effort: Option<String>,
    structured_output: bool,
}

impl<P: LlmProvider + ?Sized> LlmClassifier<P> {
    pub fn new(
        provider: Arc<P>,
        settings: ClassifierSettings,
        inference: &InferenceSettings,
    ) -> Self {
        Self {
            provider,
            settings,
            max_completion_tokens: inference.max_completion_tokens,
            reasoning_effort: inference.reasoning_effort.clone(),
            structured_output: inference.structured_output,
        }
    }

    /// Builds the completion request for one batch.
    pub fn build_request(&self, batch: &[Candidate]) -> Result<CompletionRequest> {
        let items: Vec<PromptItem<'_>> = batch
            .iter()
            .map(|c| PromptItem {
                id: c.id.as_str(),
                subject: &c.subject,
                snippet: &c.snippet,
            })
            .collect();
        let user = format!("{USER_PROMPT_HEADER}{}", serde_json::to_string(&items)?);

        let format = if self.structured_output {
            ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: SCHEMA_NAME.to_string(),
                    schema: response_schema(),
                    strict: true,
                },
            }
        } else {
            ResponseFormat::JsonObject
        };

        Ok(CompletionRequest::new(vec![ChatMessage::user(user)])
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(0.0)
            .with_max_tokens(self.max_completion_tokens)
            .with_reasoning_effort(self.reasoning_effort.clone())
            .with_response_format(format))
    }

    /// Classifies a batch, halving it on schema failures.
    ///
    /// Work is kept on an explicit stack, right half pushed first, so halves
    /// are resolved left to right and results stay in input order.
    async fn classify_splitting(&self, batch: &[Candidate]) -> Result<Vec<ClassificationResult>> {
        let max_depth = split_depth_limit(batch.len());
        let mut results = Vec::with_capacity(batch.len());
        let mut stack: Vec<(Range<usize>, usize)> = vec![(0..batch.len(), 0)];

        while let Some((range, depth)) = stack.pop() {
            let slice = &batch[range.clone()];
            match self.request_once(slice).await? {
                BatchOutcome::Classified(classified) => results.extend(classified),
                BatchOutcome::SchemaFailure(message) => {
                    if slice.len() <= 1 {
                        return Err(ClassifyError::SchemaValidation {
                            batch_size: slice.len(),
                            message,
                        });
                    }
                    if depth >= max_depth {
                        return Err(ClassifyError::SplitDepthExceeded { depth });
                    }

                    let mid = range.start + slice.len().div_ceil(2);
                    tracing::info!(
                        batch_size = slice.len(),
                        left = mid - range.start,
                        right = range.end - mid,
                        %message,
                        "schema validation failed, splitting batch"
                    );
                    stack.push((mid..range.end, depth + 1));
                    stack.push((range.start..mid, depth + 1));
                }
            }
        }

        Ok(results)
    }

    /// Sends one request, sleeping through rate limits.
    async fn request_once(&self, batch: &[Candidate]) -> Result<BatchOutcome> {
        let request = self.build_request(batch)?;
        let mut retries = 0u32;

        let response = loop {
            match self.provider.complete(&request).await {
                Ok(response) => break response,
                Err(LlmError::RateLimited {
                    status,
                    retry_after,
                    ..
                }) => {
                    if retries >= self.settings.max_rate_limit_retries {
                        return Err(ClassifyError::RateLimitRetriesExhausted { retries });
                    }
                    retries += 1;
                    let delay = retry_after.unwrap_or_else(|| self.settings.fallback_retry_delay());
                    tracing::warn!(
                        status,
                        delay_ms = delay.as_millis() as u64,
                        attempt = retries,
                        "inference rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(LlmError::SchemaValidation { message, .. }) => {
                    return Ok(BatchOutcome::SchemaFailure(message));
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.interpret(batch, response)
    }

    fn interpret(&self, batch: &[Candidate], response: CompletionResponse) -> Result<BatchOutcome> {
        let results = extract_json(&response.text)
            .and_then(|mut value| value.get_mut("results").map(Value::take))
            .filter(Value::is_array);

        let Some(results) = results else {
            if self.settings.log_raw_response_on_parse_failure {
                tracing::warn!(
                    raw = %response.raw_body,
                    content = %response.text,
                    "classifier response did not match the expected shape"
                );
            }
            return Err(ClassifyError::MalformedResponse { raw: response.text });
        };

        match map_results(batch, results) {
            Ok(classified) => Ok(BatchOutcome::Classified(classified)),
            Err(message) => Ok(BatchOutcome::SchemaFailure(message)),
        }
    }
}

#[async_trait]
impl<P: LlmProvider + ?Sized> Classifier for LlmClassifier<P> {
    async fn classify(&self, batch: &[Candidate]) -> Result<Vec<ClassificationResult>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(batch_size = batch.len(), "classifying batch");
        self.classify_splitting(batch).await
    }

    fn batch_delay(&self) -> Duration {
        self.settings.inter_batch_delay()
    }
}

/// Maps validated model output onto the batch.
///
/// Items for IDs outside the batch are dropped before anything else is
/// checked. A structural problem in any remaining item is reported as a
/// schema failure, and missing IDs become [`ClassificationResult::omitted`].
fn map_results(
    batch: &[Candidate],
    results: Value,
) -> std::result::Result<Vec<ClassificationResult>, String> {
    let items: Vec<Value> =
        serde_json::from_value(results).map_err(|e| format!("invalid results array: {e}"))?;

    let batch_ids: HashSet<&str> = batch.iter().map(|c| c.id.as_str()).collect();
    let (in_batch, unknown): (Vec<Value>, Vec<Value>) = items.into_iter().partition(|item| {
        item.get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| batch_ids.contains(id))
    });
    if !unknown.is_empty() {
        tracing::debug!(
            unknown = unknown.len(),
            "ignoring results for ids outside the batch"
        );
    }

    let raw = in_batch
        .into_iter()
        .map(|item| {
            serde_json::from_value::<RawResult>(item)
                .map_err(|e| format!("invalid result item: {e}"))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_id: HashMap<&str, (Verdict, f64)> = HashMap::with_capacity(raw.len());
    for item in &raw {
        let verdict = Verdict::parse_lenient(&item.verdict)
            .ok_or_else(|| format!("result {} has unknown verdict {:?}", item.id, item.verdict))?;
        by_id
            .entry(item.id.as_str())
            .or_insert((verdict, item.confidence.clamp(0.0, 1.0)));
    }

    Ok(batch
        .iter()
        .map(|c| match by_id.get(c.id.as_str()) {
            Some(&(verdict, confidence)) => {
                ClassificationResult::new(c.id.clone(), verdict, confidence)
            }
            None => ClassificationResult::omitted(c.id.clone()),
        })
        .collect())
}

/// JSON schema for `{results: [{id, verdict, confidence}]}`.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "results": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "id": { "type": "string" },
                        "verdict": { "type": "string", "enum": ["REJECT", "OTHER"] },
                        "confidence": { "type": "number" }
                    },
                    "required": ["id", "verdict", "confidence"]
                }
            }
        },
        "required": ["results"]
    })
}

/// Leniently pulls a JSON value out of model output.
///
/// Strips a surrounding code fence, then falls back to the span between the
/// first `{` and the last `}`.
pub fn extract_json(text: &str) -> Option<Value> {
    let cleaned = strip_code_fence(text);
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(cleaned) {
        return Some(value);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// `ceil(log2(n))`: the most halvings needed to reach single items.
fn split_depth_limit(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Heuristic-only classifier: a rejection phrase anywhere in subject or
/// snippet means REJECT.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    phrases: Regex,
}

impl KeywordClassifier {
    pub fn from_settings(settings: &ClassifierSettings) -> Result<Self> {
        let escaped: Vec<String> = settings
            .rejection_phrases
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| regex::escape(p).replace(' ', r"\s+"))
            .collect();
        if escaped.is_empty() {
            return Err(ClassifyError::NoPhrases);
        }

        let phrases = RegexBuilder::new(&format!(r"\b(?:{})\b", escaped.join("|")))
            .case_insensitive(true)
            .build()?;
        Ok(Self { phrases })
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, batch: &[Candidate]) -> Result<Vec<ClassificationResult>> {
        Ok(batch
            .iter()
            .map(|c| {
                let verdict = if self.phrases.is_match(&c.searchable_text()) {
                    Verdict::Reject
                } else {
                    Verdict::Other
                };
                ClassificationResult::new(c.id.clone(), verdict, 1.0)
            })
            .collect())
    }
}
