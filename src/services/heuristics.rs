//! Local keyword and bulk-mail heuristics.
//!
//! Runs before any inference so that mail with no job vocabulary never
//! leaves the machine.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::config::FilterSettings;
use crate::domain::Message;

/// Errors building the heuristic patterns.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("no job signal terms configured")]
    NoTerms,

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Outcome of the heuristic test for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Job-related; send to the classifier.
    Candidate,
    /// Bulk mail with no job vocabulary.
    SkipBulk,
    /// No job vocabulary at all.
    SkipNoJobSignals,
}

impl FilterDecision {
    pub fn is_candidate(self) -> bool {
        matches!(self, Self::Candidate)
    }
}

/// Compiled heuristic filter.
#[derive(Debug, Clone)]
pub struct HeuristicFilter {
    job_signals: Regex,
    bulk_headers: Option<Regex>,
    skip_bulk_if_no_job_signals: bool,
}

impl HeuristicFilter {
    /// Compiles the filter from settings.
    ///
    /// Terms are escaped and matched case-insensitively on word boundaries.
    pub fn from_settings(settings: &FilterSettings) -> Result<Self, FilterError> {
        let job_signals = alternation(&settings.job_signal_terms, r"\b(?:", r")\b")?
            .ok_or(FilterError::NoTerms)?;
        let bulk_headers = alternation(&settings.bulk_header_names, "^(?:", ")$")?;

        Ok(Self {
            job_signals,
            bulk_headers,
            skip_bulk_if_no_job_signals: settings.skip_bulk_if_no_job_signals,
        })
    }

    /// Classifies a message locally.
    pub fn evaluate(&self, message: &Message) -> FilterDecision {
        if self.has_job_signals(message) {
            return FilterDecision::Candidate;
        }

        if self.skip_bulk_if_no_job_signals && self.is_bulk(message) {
            FilterDecision::SkipBulk
        } else {
            FilterDecision::SkipNoJobSignals
        }
    }

    pub fn is_candidate(&self, message: &Message) -> bool {
        self.evaluate(message).is_candidate()
    }

    /// True when subject or snippet mentions a job signal term.
    pub fn has_job_signals(&self, message: &Message) -> bool {
        self.job_signals.is_match(&message.searchable_text())
    }

    /// True when any header name marks the message as list or automated mail.
    pub fn is_bulk(&self, message: &Message) -> bool {
        match &self.bulk_headers {
            Some(re) => message.headers.names().any(|name| re.is_match(name)),
            None => false,
        }
    }
}

fn alternation(
    terms: &[String],
    prefix: &str,
    suffix: &str,
) -> Result<Option<Regex>, regex::Error> {
    let escaped: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();

    if escaped.is_empty() {
        return Ok(None);
    }

    let pattern = format!("{prefix}{}{suffix}", escaped.join("|"));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
}
