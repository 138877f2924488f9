//! Business services layer.
//!
//! Services sit between the binary and the providers:
//!
//! ```text
//!   main (CLI, credentials)
//!          |
//!          v
//!    driver -> sweep -> scanner / heuristics / classifier / labels
//!          |
//!          v
//!   Providers (Mailbox, LlmProvider), Storage (cursor, keychain)
//! ```
//!
//! # Services Overview
//!
//! - [`Scanner`]: builds the mailbox query and fetches unseen metadata
//! - [`HeuristicFilter`]: keyword and bulk-header pre-filter
//! - [`LlmClassifier`] / [`KeywordClassifier`]: verdicts for candidates
//! - [`LabelService`]: lazy label creation and chunked application
//! - [`SweepService`]: one pass of the above
//! - [`InvocationDriver`]: repeats passes and schedules the next invocation

pub mod classifier;
pub mod driver;
pub mod heuristics;
pub mod labels;
pub mod scanner;
pub mod sweep;

pub use classifier::{Classifier, ClassifyError, KeywordClassifier, LlmClassifier};
pub use driver::{run_until_done, DriverState, InvocationDriver, LocalScheduler, Scheduler};
pub use heuristics::{FilterDecision, FilterError, HeuristicFilter};
pub use labels::LabelService;
pub use scanner::{build_query, ScanError, ScanOutcome, Scanner};
pub use sweep::{PassReport, SweepError, SweepPass, SweepService};
