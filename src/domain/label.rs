//! Label domain types.
//!
//! Labels are both the user-visible output of a sweep and the only record of
//! which messages have already been evaluated.

use serde::{Deserialize, Serialize};

use super::LabelId;

/// Whether a label is listed in the label sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelListVisibility {
    #[serde(rename = "labelShow")]
    Show,
    #[serde(rename = "labelShowIfUnread")]
    ShowIfUnread,
    #[serde(rename = "labelHide")]
    Hide,
}

/// Whether a label chip is rendered on messages in the message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageListVisibility {
    Show,
    Hide,
}

/// Visibility attributes applied when a label is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelVisibility {
    pub label_list_visibility: LabelListVisibility,
    pub message_list_visibility: MessageListVisibility,
}

impl LabelVisibility {
    /// Shown in the label list and on messages.
    pub const VISIBLE: Self = Self {
        label_list_visibility: LabelListVisibility::Show,
        message_list_visibility: MessageListVisibility::Show,
    };

    /// Hidden everywhere; used for bookkeeping markers.
    pub const HIDDEN: Self = Self {
        label_list_visibility: LabelListVisibility::Hide,
        message_list_visibility: MessageListVisibility::Hide,
    };
}

/// A mailbox label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Provider identifier.
    pub id: LabelId,
    /// Display name, e.g. `Job Rejection` or `Magikmail/Scanned`.
    pub name: String,
    /// Visibility as reported by the provider, when known.
    pub visibility: Option<LabelVisibility>,
    /// Whether this is a system label (INBOX, SENT, etc.).
    pub is_system: bool,
}

/// Well-known system label IDs.
pub mod system_labels {
    use super::LabelId;

    /// Returns the inbox label ID.
    pub fn inbox() -> LabelId {
        LabelId::from("INBOX")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_uses_provider_wire_names() {
        let json = serde_json::to_value(LabelVisibility::HIDDEN).unwrap();
        assert_eq!(json["labelListVisibility"], "labelHide");
        assert_eq!(json["messageListVisibility"], "hide");

        let json = serde_json::to_value(LabelVisibility::VISIBLE).unwrap();
        assert_eq!(json["labelListVisibility"], "labelShow");
        assert_eq!(json["messageListVisibility"], "show");
    }

    #[test]
    fn label_serialization() {
        let label = Label {
            id: LabelId::from("Label_42"),
            name: "Job Rejection".to_string(),
            visibility: Some(LabelVisibility::VISIBLE),
            is_system: false,
        };

        let json = serde_json::to_string(&label).unwrap();
        let deserialized: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, label);
    }

    #[test]
    fn inbox_label_id() {
        assert_eq!(system_labels::inbox().0, "INBOX");
    }
}
