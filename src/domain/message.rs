//! Message metadata as fetched from the mailbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LabelId, MessageId, ThreadId};

/// A single header as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered header set with case-insensitive lookup.
///
/// When a header appears more than once the last occurrence wins on lookup,
/// which matches how the metadata endpoint is usually consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new(headers: Vec<Header>) -> Self {
        Self(headers)
    }

    /// Returns the value of the named header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Iterates over header names in fetch order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|h| h.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Metadata-only view of a message: headers and snippet, never the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: Option<ThreadId>,
    /// Raw `From` header.
    pub from: String,
    pub subject: String,
    /// Raw `Date` header.
    pub date: String,
    /// Provider receive time, when reported.
    pub internal_date: Option<DateTime<Utc>>,
    pub snippet: String,
    pub headers: Headers,
    pub label_ids: Vec<LabelId>,
}

impl Message {
    /// Builds a message from a header set, pulling the well-known fields out.
    pub fn from_headers(
        id: MessageId,
        headers: Headers,
        snippet: impl Into<String>,
        label_ids: Vec<LabelId>,
    ) -> Self {
        let field = |name: &str| headers.get(name).unwrap_or_default().to_string();
        Self {
            id,
            thread_id: None,
            from: field("From"),
            subject: field("Subject"),
            date: field("Date"),
            internal_date: None,
            snippet: snippet.into(),
            headers,
            label_ids,
        }
    }

    /// Subject and snippet joined the way the keyword heuristics read them.
    pub fn searchable_text(&self) -> String {
        format!("{}\n{}", self.subject, self.snippet)
    }

    pub fn has_label(&self, label: &LabelId) -> bool {
        self.label_ids.iter().any(|l| l == label)
    }
}

/// A message that passed the heuristic filter and is eligible for classification.
///
/// Candidates only live for the duration of a single pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: MessageId,
    pub from: String,
    pub subject: String,
    pub date: String,
    pub snippet: String,
}

impl Candidate {
    pub fn searchable_text(&self) -> String {
        format!("{}\n{}", self.subject, self.snippet)
    }
}

impl From<&Message> for Candidate {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            from: msg.from.clone(),
            subject: msg.subject.clone(),
            date: msg.date.clone(),
            snippet: msg.snippet.clone(),
        }
    }
}
