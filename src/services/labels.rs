//! Label applicator.
//!
//! Labels are created on first use and applied in bounded bulk calls.
//! Applying a label a message already carries is a no-op on the provider
//! side, so every operation here can be repeated safely.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{Label, LabelId, LabelVisibility, MessageId};
use crate::providers::email::{LabelChange, Mailbox, Result, MAX_IDS_PER_MODIFY};

/// Ensures labels exist and applies them to messages.
pub struct LabelService<M: Mailbox + ?Sized> {
    mailbox: Arc<M>,
}

impl<M: Mailbox + ?Sized> LabelService<M> {
    pub fn new(mailbox: Arc<M>) -> Self {
        Self { mailbox }
    }

    /// Returns the label with exactly this name, creating it if absent.
    pub async fn ensure_label(&self, name: &str, visibility: LabelVisibility) -> Result<Label> {
        let labels = self.mailbox.list_labels().await?;
        if let Some(existing) = labels.into_iter().find(|l| l.name == name) {
            return Ok(existing);
        }

        tracing::info!(label = name, "creating label");
        self.mailbox.create_label(name, visibility).await
    }

    /// Adds `label` to every message in `ids`.
    ///
    /// Duplicate IDs are dropped and the rest are sent in chunks of at most
    /// [`MAX_IDS_PER_MODIFY`]. Returns the number of provider calls made.
    pub async fn apply(&self, ids: &[MessageId], label: &LabelId) -> Result<usize> {
        let unique = dedupe(ids);
        if unique.is_empty() {
            return Ok(0);
        }

        let change = LabelChange::add(label.clone());
        let mut calls = 0;
        for chunk in unique.chunks(MAX_IDS_PER_MODIFY) {
            self.mailbox.batch_modify(chunk, &change).await?;
            calls += 1;
        }

        tracing::debug!(label = %label, labeled = unique.len(), calls, "applied label");
        Ok(calls)
    }
}

/// Drops repeated IDs, keeping first-seen order.
pub(crate) fn dedupe(ids: &[MessageId]) -> Vec<MessageId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}
