//! Explicit scan cursor, used when the hidden scanned marker is disabled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the next listing should resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    /// Opaque provider page token for the next listing page.
    pub page_token: String,
    /// When the cursor was last advanced.
    pub updated_at: DateTime<Utc>,
}

impl ScanCursor {
    pub fn new(page_token: impl Into<String>) -> Self {
        Self {
            page_token: page_token.into(),
            updated_at: Utc::now(),
        }
    }
}
