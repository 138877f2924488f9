//! Per-message processing status.
//!
//! There is no datastore behind this: the status is read straight off the
//! message's label membership, so the mailbox itself is the persisted cursor.

use serde::{Deserialize, Serialize};

use super::{LabelId, Message};

/// Where a message stands with respect to the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Never evaluated.
    Unseen,
    /// Evaluated, not a rejection (or below threshold).
    Scanned,
    /// Carries the rejection label.
    Rejected,
}

/// Resolved label IDs that encode processing status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLabels {
    pub rejection: LabelId,
    /// `None` when the hidden marker is disabled.
    pub scanned: Option<LabelId>,
}

impl StatusLabels {
    /// Derives the status of a message. Rejection takes precedence over scanned.
    pub fn status_of(&self, message: &Message) -> ProcessingStatus {
        if message.has_label(&self.rejection) {
            ProcessingStatus::Rejected
        } else if self
            .scanned
            .as_ref()
            .is_some_and(|scanned| message.has_label(scanned))
        {
            ProcessingStatus::Scanned
        } else {
            ProcessingStatus::Unseen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Headers, MessageId};

    fn message_with(labels: &[&str]) -> Message {
        Message::from_headers(
            MessageId::from("m1"),
            Headers::default(),
            "",
            labels.iter().copied().map(LabelId::from).collect(),
        )
    }

    fn labels() -> StatusLabels {
        StatusLabels {
            rejection: LabelId::from("Label_rej"),
            scanned: Some(LabelId::from("Label_scan")),
        }
    }

    #[test]
    fn unlabeled_message_is_unseen() {
        assert_eq!(labels().status_of(&message_with(&["INBOX"])), ProcessingStatus::Unseen);
    }

    #[test]
    fn scanned_marker_means_scanned() {
        assert_eq!(
            labels().status_of(&message_with(&["INBOX", "Label_scan"])),
            ProcessingStatus::Scanned
        );
    }

    #[test]
    fn rejection_wins_over_scanned() {
        assert_eq!(
            labels().status_of(&message_with(&["Label_scan", "Label_rej"])),
            ProcessingStatus::Rejected
        );
    }

    #[test]
    fn disabled_marker_is_ignored() {
        let labels = StatusLabels {
            scanned: None,
            ..labels()
        };
        assert_eq!(labels.status_of(&message_with(&["Label_scan"])), ProcessingStatus::Unseen);
    }
}
