//! Mailbox provider trait definition.
//!
//! This module defines the [`Mailbox`] trait which abstracts over the mail
//! store: query search, metadata-only message fetch, label management and
//! bulk label modification. The sweep services only ever talk to a mailbox
//! through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Label, LabelId, LabelVisibility, Message, MessageId};

/// Result type alias for mailbox operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Maximum message IDs accepted by one [`Mailbox::batch_modify`] call.
pub const MAX_IDS_PER_MODIFY: usize = 1000;

/// Errors that can occur during mailbox operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit or daily quota exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether retrying later has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::RateLimited { .. })
    }
}

/// Pagination parameters for list operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of items to return.
    pub limit: Option<u32>,
    /// Opaque cursor for the next page of results.
    pub page_token: Option<String>,
}

impl Pagination {
    /// Creates a new pagination with the specified limit.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            page_token: None,
        }
    }

    /// Continues from a previously returned page token.
    pub fn resume(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Matching message IDs in provider order.
    pub ids: Vec<MessageId>,
    /// Token for the following page, if any.
    pub next_page_token: Option<String>,
}

/// Label modifications applied to a set of messages in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChange {
    pub add: Vec<LabelId>,
    pub remove: Vec<LabelId>,
}

impl LabelChange {
    pub fn add(label: LabelId) -> Self {
        Self {
            add: vec![label],
            remove: Vec::new(),
        }
    }
}

/// Trait for mail store implementations.
///
/// # Example
///
/// ```ignore
/// use rejection_sorter::providers::email::{Mailbox, Pagination};
///
/// async fn count_unread(mailbox: &dyn Mailbox) -> Result<usize> {
///     let page = mailbox.search("is:unread", Pagination::with_limit(100)).await?;
///     Ok(page.ids.len())
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Searches messages using the provider's query language.
    ///
    /// # Arguments
    ///
    /// * `query` - Search expression, e.g. `in:inbox -label:"Job Rejection"`
    /// * `pagination` - Page size and continuation token
    async fn search(&self, query: &str, pagination: Pagination) -> Result<MessagePage>;

    /// Fetches headers and snippet for a message, never the body.
    ///
    /// # Arguments
    ///
    /// * `id` - Message to fetch
    /// * `headers` - Header names to include
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if the message does not exist.
    async fn get_metadata(&self, id: &MessageId, headers: &[String]) -> Result<Message>;

    /// Lists all labels, system and user-created.
    async fn list_labels(&self) -> Result<Vec<Label>>;

    /// Creates a user label with the given visibility.
    async fn create_label(&self, name: &str, visibility: LabelVisibility) -> Result<Label>;

    /// Adds and removes labels on many messages in one call.
    ///
    /// Callers send at most [`MAX_IDS_PER_MODIFY`] IDs per call.
    async fn batch_modify(&self, ids: &[MessageId], change: &LabelChange) -> Result<()>;
}
