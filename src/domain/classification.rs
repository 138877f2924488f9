//! Classification verdicts.

use serde::{Deserialize, Serialize};

use super::MessageId;

/// Outcome of classifying a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// A job-application rejection.
    Reject,
    /// Anything else, including job mail that is not a rejection.
    Other,
}

impl Verdict {
    /// Parses a verdict the way the model tends to emit it: any case, padded.
    ///
    /// Unknown strings yield `None` so callers can treat them as schema violations.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "REJECT" => Some(Self::Reject),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Verdict and confidence for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub id: MessageId,
    pub verdict: Verdict,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ClassificationResult {
    pub fn new(id: MessageId, verdict: Verdict, confidence: f64) -> Self {
        Self {
            id,
            verdict,
            confidence,
        }
    }

    /// A result for an item the classifier said nothing about.
    pub fn omitted(id: MessageId) -> Self {
        Self::new(id, Verdict::Other, 0.0)
    }

    /// True only for a REJECT verdict at or above the threshold.
    pub fn is_confident_rejection(&self, min_confidence: f64) -> bool {
        self.verdict == Verdict::Reject && self.confidence >= min_confidence
    }
}
