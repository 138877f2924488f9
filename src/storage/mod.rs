//! Credential and progress storage.
//!
//! - OS keychain integration for the Gmail OAuth credentials and the
//!   inference API key
//! - The optional explicit scan cursor
//!
//! There is no database: the mailbox's labels are the primary record of
//! what has been processed.

mod keychain;
mod progress;

pub use keychain::{KeychainAccess, KeychainError};
pub use progress::{JsonProgressStore, MemoryProgressStore, ProgressError, ProgressStore};
