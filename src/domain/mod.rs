//! Domain layer types for the rejection sorter.
//!
//! Messages, candidates, labels and classification verdicts, plus the
//! label-derived processing status that doubles as the sweep's progress record.

mod classification;
mod cursor;
mod label;
mod message;
mod status;
mod types;

pub use classification::{ClassificationResult, Verdict};
pub use cursor::ScanCursor;
pub use label::{
    system_labels, Label, LabelListVisibility, LabelVisibility, MessageListVisibility,
};
pub use message::{Candidate, Header, Headers, Message};
pub use status::{ProcessingStatus, StatusLabels};
pub use types::{LabelId, MessageId, ThreadId};
