//! One scan, filter, classify, label pass.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::Settings;
use crate::domain::{Candidate, LabelVisibility, MessageId, StatusLabels};
use crate::providers::email::{Mailbox, ProviderError};
use crate::storage::{ProgressError, ProgressStore};

use super::classifier::{ClassifyError, Classifier};
use super::heuristics::{FilterDecision, FilterError, HeuristicFilter};
use super::labels::LabelService;
use super::scanner::{ScanError, ScanOutcome, Scanner};

/// Errors that abort a pass.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("mailbox error: {0}")]
    Mailbox(#[from] ProviderError),

    #[error("classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("progress store error: {0}")]
    Progress(#[from] ProgressError),

    #[error("filter setup error: {0}")]
    Filter(#[from] FilterError),
}

impl From<ScanError> for SweepError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Mailbox(e) => Self::Mailbox(e),
            ScanError::Progress(e) => Self::Progress(e),
        }
    }
}

impl SweepError {
    /// Infrastructure failures worth retrying on a later invocation.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Mailbox(e) => e.is_transient(),
            Self::Classify(ClassifyError::Llm(_))
            | Self::Classify(ClassifyError::RateLimitRetriesExhausted { .. }) => true,
            _ => false,
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// IDs on the listed page.
    pub listed: usize,
    /// Messages brought to a final status this pass.
    pub processed: usize,
    /// Candidates sent to the classifier.
    pub sent_to_classifier: usize,
    /// Messages that received the rejection label.
    pub labeled_rejections: usize,
    /// Bulk mail skipped locally.
    pub skipped_bulk: usize,
    /// Mail without job vocabulary skipped locally.
    pub skipped_no_signals: usize,
    /// The pass stopped at its deadline with work left on the page.
    pub interrupted: bool,
    /// Nothing is left to scan.
    pub complete: bool,
}

impl PassReport {
    /// True when the sweep can stop: nothing was processed and nothing was
    /// cut short, or the scan reached its end.
    pub fn is_final(&self) -> bool {
        self.complete || (self.processed == 0 && !self.interrupted)
    }
}

/// A single unit of sweep work, run repeatedly by the invocation driver.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SweepPass: Send + Sync {
    async fn run_pass(&self, deadline: Instant) -> Result<PassReport, SweepError>;
}

/// Runs passes against a mailbox with a classifier.
pub struct SweepService<M: Mailbox + ?Sized> {
    settings: Arc<Settings>,
    scanner: Scanner<M>,
    filter: HeuristicFilter,
    classifier: Arc<dyn Classifier>,
    labels: LabelService<M>,
}

impl<M: Mailbox + ?Sized> SweepService<M> {
    pub fn new(
        mailbox: Arc<M>,
        classifier: Arc<dyn Classifier>,
        settings: Arc<Settings>,
    ) -> Result<Self, SweepError> {
        let filter = HeuristicFilter::from_settings(&settings.filter)?;
        Ok(Self {
            scanner: Scanner::new(Arc::clone(&mailbox), Arc::clone(&settings)),
            labels: LabelService::new(mailbox),
            settings,
            filter,
            classifier,
        })
    }

    /// Tracks progress with a page-token cursor when the scanned label is off.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressStore>) -> Self {
        self.scanner = self.scanner.with_progress(progress);
        self
    }

    /// Resolves the status labels, creating them on first use.
    pub async fn ensure_labels(&self) -> Result<StatusLabels, SweepError> {
        let labels = &self.settings.labels;
        let rejection = self
            .labels
            .ensure_label(&labels.rejection, LabelVisibility::VISIBLE)
            .await?;
        let scanned = if labels.use_scanned_label {
            Some(
                self.labels
                    .ensure_label(&labels.scanned, LabelVisibility::HIDDEN)
                    .await?
                    .id,
            )
        } else {
            None
        };

        Ok(StatusLabels {
            rejection: rejection.id,
            scanned,
        })
    }

    /// Runs one pass, stopping early at `deadline` or at the per-pass budget,
    /// whichever comes first.
    pub async fn pass(&self, deadline: Instant) -> Result<PassReport, SweepError> {
        let deadline = deadline.min(Instant::now() + self.settings.scan.max_runtime());
        let status = self.ensure_labels().await?;

        let outcome = self.scanner.scan(&status, deadline).await?;
        let mut report = PassReport {
            listed: outcome.listed,
            interrupted: outcome.timed_out,
            ..PassReport::default()
        };

        if outcome.is_exhausted() {
            tracing::info!("no candidate emails left for this query");
            self.scanner.advance(None).await?;
            report.complete = true;
            return Ok(report);
        }

        let (candidates, skipped) = self.triage(&outcome, &mut report);
        tracing::info!(
            listed = outcome.listed,
            fetched = outcome.messages.len(),
            candidates = candidates.len(),
            "triaged messages"
        );

        let (rejections, classified) = self.classify(&candidates, deadline, &mut report).await?;

        // Rejection label strictly before the scanned marker.
        report.labeled_rejections = rejections.len();
        self.labels.apply(&rejections, &status.rejection).await?;

        let mut finished = skipped;
        finished.extend(classified);
        report.processed = finished.len();
        if let Some(scanned) = &status.scanned {
            self.labels.apply(&finished, scanned).await?;
        }

        if !report.interrupted {
            self.scanner.advance(outcome.next_page_token.as_deref()).await?;
            report.complete = self.scanner.uses_cursor() && outcome.next_page_token.is_none();
        }

        tracing::info!(
            processed = report.processed,
            sent = report.sent_to_classifier,
            labeled = report.labeled_rejections,
            "pass finished"
        );
        Ok(report)
    }

    /// Splits fetched messages into classifier candidates and locally
    /// skipped IDs.
    fn triage(
        &self,
        outcome: &ScanOutcome,
        report: &mut PassReport,
    ) -> (Vec<Candidate>, Vec<MessageId>) {
        let mut candidates = Vec::new();
        let mut skipped = Vec::new();

        for message in &outcome.messages {
            match self.filter.evaluate(message) {
                FilterDecision::Candidate => candidates.push(Candidate::from(message)),
                FilterDecision::SkipBulk => {
                    report.skipped_bulk += 1;
                    skipped.push(message.id.clone());
                }
                FilterDecision::SkipNoJobSignals => {
                    report.skipped_no_signals += 1;
                    skipped.push(message.id.clone());
                }
            }
        }

        (candidates, skipped)
    }

    /// Classifies candidates batch by batch until done or out of time.
    ///
    /// Returns the confident rejections and every ID that was classified.
    async fn classify(
        &self,
        candidates: &[Candidate],
        deadline: Instant,
        report: &mut PassReport,
    ) -> Result<(Vec<MessageId>, Vec<MessageId>), SweepError> {
        let min_confidence = self.settings.classifier.min_confidence;
        let mut rejections = Vec::new();
        let mut classified = Vec::with_capacity(candidates.len());

        let mut batches = candidates
            .chunks(self.settings.classifier.batch_size.max(1))
            .peekable();
        while let Some(batch) = batches.next() {
            if Instant::now() >= deadline {
                report.interrupted = true;
                tracing::info!(
                    remaining = candidates.len() - classified.len(),
                    "deadline reached before classification finished"
                );
                break;
            }

            report.sent_to_classifier += batch.len();
            let results = self.classifier.classify(batch).await?;
            rejections.extend(
                results
                    .iter()
                    .filter(|r| r.is_confident_rejection(min_confidence))
                    .map(|r| r.id.clone()),
            );
            classified.extend(batch.iter().map(|c| c.id.clone()));

            let delay = self.classifier.batch_delay();
            if !delay.is_zero() && batches.peek().is_some() {
                tokio::time::sleep(delay).await;
            }
        }

        Ok((rejections, classified))
    }
}

#[async_trait]
impl<M: Mailbox + ?Sized> SweepPass for SweepService<M> {
    async fn run_pass(&self, deadline: Instant) -> Result<PassReport, SweepError> {
        self.pass(deadline).await
    }
}
