//! Mailbox provider implementations.
//!
//! This module contains the [`Mailbox`] trait and the Gmail REST
//! implementation, [`GmailMailbox`].
//!
//! # Architecture
//!
//! The sweep only needs a narrow slice of a mail store:
//!
//! - Query search with label inclusion/exclusion
//! - Metadata-only message fetch (headers + snippet)
//! - Label listing and creation
//! - Bulk label modification
//!
//! Anything that implements those four operations can be swept.

mod gmail;
mod traits;

pub use gmail::{GmailCredentials, GmailMailbox};
pub use traits::{
    LabelChange, Mailbox, MessagePage, Pagination, ProviderError, Result, MAX_IDS_PER_MODIFY,
};

#[cfg(test)]
pub use traits::MockMailbox;
