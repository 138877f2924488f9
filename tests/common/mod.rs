//! Shared fixtures for integration tests: an in-memory mailbox that honours
//! label exclusions in queries, and a scripted inference provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use rejection_sorter::domain::{
    system_labels, Header, Headers, Label, LabelId, LabelVisibility, Message, MessageId,
};
use rejection_sorter::providers::ai::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, LlmResult, TokenUsage,
};
use rejection_sorter::providers::email::{
    LabelChange, Mailbox, MessagePage, Pagination, ProviderError, Result, MAX_IDS_PER_MODIFY,
};

// ============================================================================
// In-memory mailbox
// ============================================================================

#[derive(Default)]
struct MailboxState {
    messages: Vec<Message>,
    labels: Vec<Label>,
    search_calls: usize,
    metadata_calls: usize,
    modify_calls: usize,
}

/// Mailbox backed by a vector. Search returns every stored message not
/// carrying a label excluded with `-label:"Name"`, paged by offset.
#[derive(Default)]
pub struct InMemoryMailbox {
    state: Mutex<MailboxState>,
    /// Simulates a search index that has not caught up with label changes.
    pub stale_index: bool,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_index() -> Self {
        Self {
            stale_index: true,
            ..Self::default()
        }
    }

    pub fn add_message(&self, id: &str, subject: &str, snippet: &str, extra: &[(&str, &str)]) {
        let mut headers = vec![
            Header::new("From", "someone@example.com"),
            Header::new("Subject", subject),
            Header::new("Date", "Mon, 6 Jan 2025 09:00:00 +0000"),
        ];
        headers.extend(extra.iter().map(|(n, v)| Header::new(*n, *v)));
        let message = Message::from_headers(
            MessageId::from(id),
            Headers::new(headers),
            snippet,
            vec![system_labels::inbox()],
        );
        self.state.lock().unwrap().messages.push(message);
    }

    /// Creates a label up front, as if a previous run had made it.
    pub fn add_label(&self, name: &str) -> LabelId {
        let mut state = self.state.lock().unwrap();
        let id = LabelId::from(format!("Label_{}", state.labels.len() + 1));
        state.labels.push(Label {
            id: id.clone(),
            name: name.to_string(),
            visibility: None,
            is_system: false,
        });
        id
    }

    pub fn tag(&self, message: &str, label: &LabelId) {
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state.messages.iter_mut().find(|m| m.id.as_str() == message) {
            if !m.label_ids.contains(label) {
                m.label_ids.push(label.clone());
            }
        }
    }

    pub fn label(&self, name: &str) -> Option<Label> {
        let state = self.state.lock().unwrap();
        state.labels.iter().find(|l| l.name == name).cloned()
    }

    /// Sorted label names on a message, excluding INBOX.
    pub fn label_names(&self, message: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let by_id: HashMap<&LabelId, &str> =
            state.labels.iter().map(|l| (&l.id, l.name.as_str())).collect();
        let mut names: Vec<String> = state
            .messages
            .iter()
            .find(|m| m.id.as_str() == message)
            .map(|m| {
                m.label_ids
                    .iter()
                    .filter_map(|id| by_id.get(id).map(|n| n.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn metadata_calls(&self) -> usize {
        self.state.lock().unwrap().metadata_calls
    }

    pub fn modify_calls(&self) -> usize {
        self.state.lock().unwrap().modify_calls
    }
}

fn excluded_label_names(query: &str) -> Vec<String> {
    query
        .split("-label:\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    async fn search(&self, query: &str, pagination: Pagination) -> Result<MessagePage> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;

        let excluded: Vec<LabelId> = if self.stale_index {
            Vec::new()
        } else {
            let names = excluded_label_names(query);
            state
                .labels
                .iter()
                .filter(|l| names.contains(&l.name))
                .map(|l| l.id.clone())
                .collect()
        };

        let matching: Vec<MessageId> = state
            .messages
            .iter()
            .filter(|m| !m.label_ids.iter().any(|l| excluded.contains(l)))
            .map(|m| m.id.clone())
            .collect();

        let offset: usize = pagination
            .page_token
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        let limit = pagination.limit.unwrap_or(100) as usize;
        let end = (offset + limit).min(matching.len());
        let ids = matching.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_metadata(&self, id: &MessageId, _headers: &[String]) -> Result<Message> {
        let mut state = self.state.lock().unwrap();
        state.metadata_calls += 1;
        state
            .messages
            .iter()
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str, visibility: LabelVisibility) -> Result<Label> {
        let mut state = self.state.lock().unwrap();
        let label = Label {
            id: LabelId::from(format!("Label_{}", state.labels.len() + 1)),
            name: name.to_string(),
            visibility: Some(visibility),
            is_system: false,
        };
        state.labels.push(label.clone());
        Ok(label)
    }

    async fn batch_modify(&self, ids: &[MessageId], change: &LabelChange) -> Result<()> {
        if ids.len() > MAX_IDS_PER_MODIFY {
            return Err(ProviderError::InvalidRequest("too many ids".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.modify_calls += 1;
        for message in state.messages.iter_mut().filter(|m| ids.contains(&m.id)) {
            message.label_ids.retain(|l| !change.remove.contains(l));
            for label in &change.add {
                if !message.label_ids.contains(label) {
                    message.label_ids.push(label.clone());
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Scripted inference provider
// ============================================================================

/// One item as it appears in the classifier prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptItem {
    pub id: String,
    pub subject: String,
    pub snippet: String,
}

type Responder = Box<dyn Fn(&[PromptItem]) -> LlmResult<CompletionResponse> + Send + Sync>;

/// Inference provider that answers with a closure and records every batch.
pub struct ScriptedLlm {
    responder: Responder,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedLlm {
    pub fn new(
        responder: impl Fn(&[PromptItem]) -> LlmResult<CompletionResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Rejects items whose snippet contains `marker` (case-insensitive).
    pub fn rejecting(marker: &'static str) -> Self {
        Self::new(move |items| {
            Ok(results(items.iter().map(|item| {
                let reject = item.snippet.to_lowercase().contains(marker);
                (item.id.as_str(), if reject { "REJECT" } else { "OTHER" }, 0.95)
            })))
        })
    }

    /// IDs sent in each call, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let items = prompt_items(request);
        self.calls
            .lock()
            .unwrap()
            .push(items.iter().map(|i| i.id.clone()).collect());
        (self.responder)(&items)
    }
}

/// Parses the JSON item list out of the user prompt.
pub fn prompt_items(request: &CompletionRequest) -> Vec<PromptItem> {
    let user = &request.messages.last().unwrap().content;
    let (_, json) = user.split_once("ITEMS:\n").unwrap();
    serde_json::from_str(json).unwrap()
}

/// Builds a successful response carrying `{results: [...]}`.
pub fn results<'a>(items: impl IntoIterator<Item = (&'a str, &'a str, f64)>) -> CompletionResponse {
    let results: Vec<serde_json::Value> = items
        .into_iter()
        .map(|(id, verdict, confidence)| {
            serde_json::json!({"id": id, "verdict": verdict, "confidence": confidence})
        })
        .collect();
    let text = serde_json::json!({ "results": results }).to_string();
    CompletionResponse {
        raw_body: text.clone(),
        text,
        tokens_used: TokenUsage::default(),
        finish_reason: FinishReason::Stop,
    }
}
