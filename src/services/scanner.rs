//! Mailbox scanning.
//!
//! Lists one page of messages matching the job query, then fetches
//! metadata for each until the invocation deadline. Progress lives in the
//! mailbox itself: processed messages carry a label the query excludes.
//! When the hidden scanned label is disabled an explicit page-token cursor
//! takes its place.

use std::sync::Arc;

use tokio::time::Instant;

use super::labels::dedupe;
use crate::config::Settings;
use crate::domain::{Message, ProcessingStatus, ScanCursor, StatusLabels};
use crate::providers::email::{Mailbox, Pagination, ProviderError};
use crate::storage::{ProgressError, ProgressStore};

/// Headers always requested with message metadata.
const BASE_HEADERS: [&str; 3] = ["From", "Subject", "Date"];

/// Errors that can occur while scanning.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Mailbox(#[from] ProviderError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Result of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Unseen messages with metadata, in listing order.
    pub messages: Vec<Message>,
    /// Provider token for the following page.
    pub next_page_token: Option<String>,
    /// Distinct IDs on the listed page.
    pub listed: usize,
    /// Fetching stopped at the deadline before the page was exhausted.
    pub timed_out: bool,
}

impl ScanOutcome {
    /// An empty listing means nothing is left to scan.
    pub fn is_exhausted(&self) -> bool {
        self.listed == 0
    }
}

/// Builds the mailbox query.
///
/// `in:inbox (t1 OR t2 ...) -label:"<rejection>" [-label:"<scanned>"]`
pub fn build_query(settings: &Settings) -> String {
    let terms = settings.scan.query_terms.join(" OR ");
    let mut query = format!(
        "in:inbox ({terms}) -label:\"{}\"",
        settings.labels.rejection
    );
    if settings.labels.use_scanned_label {
        query.push_str(&format!(" -label:\"{}\"", settings.labels.scanned));
    }
    query
}

/// Lists and fetches unseen candidate messages.
pub struct Scanner<M: Mailbox + ?Sized> {
    mailbox: Arc<M>,
    settings: Arc<Settings>,
    progress: Option<Arc<dyn ProgressStore>>,
}

impl<M: Mailbox + ?Sized> Scanner<M> {
    pub fn new(mailbox: Arc<M>, settings: Arc<Settings>) -> Self {
        Self {
            mailbox,
            settings,
            progress: None,
        }
    }

    /// Attaches the cursor store consulted when the scanned label is disabled.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressStore>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn cursor_store(&self) -> Option<&Arc<dyn ProgressStore>> {
        if self.settings.labels.use_scanned_label {
            None
        } else {
            self.progress.as_ref()
        }
    }

    /// Whether progress is tracked by page token rather than label.
    pub fn uses_cursor(&self) -> bool {
        self.cursor_store().is_some()
    }

    /// Header names requested for each message.
    pub fn metadata_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = BASE_HEADERS.iter().map(|h| h.to_string()).collect();
        for name in &self.settings.filter.bulk_header_names {
            if !headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                headers.push(name.clone());
            }
        }
        headers
    }

    /// Lists one page and fetches metadata until `deadline`.
    ///
    /// Messages that already carry a status label are dropped even if the
    /// provider's search index has not caught up yet.
    pub async fn scan(
        &self,
        status: &StatusLabels,
        deadline: Instant,
    ) -> Result<ScanOutcome, ScanError> {
        let query = build_query(&self.settings);
        let resume = match self.cursor_store() {
            Some(store) => store.load().await?.map(|c| c.page_token),
            None => None,
        };

        tracing::info!(%query, resumed = resume.is_some(), "listing candidate messages");
        let page = self
            .mailbox
            .search(
                &query,
                Pagination::with_limit(self.settings.scan.list_page_size).resume(resume),
            )
            .await?;

        let ids = dedupe(&page.ids);
        let mut outcome = ScanOutcome {
            messages: Vec::with_capacity(ids.len()),
            next_page_token: page.next_page_token,
            listed: ids.len(),
            timed_out: false,
        };

        let headers = self.metadata_headers();
        for id in ids {
            if Instant::now() >= deadline {
                outcome.timed_out = true;
                tracing::info!(
                    fetched = outcome.messages.len(),
                    listed = outcome.listed,
                    "deadline reached while fetching metadata"
                );
                break;
            }

            let message = match self.mailbox.get_metadata(&id, &headers).await {
                Ok(message) => message,
                Err(ProviderError::NotFound(_)) => {
                    tracing::debug!(id = %id, "message disappeared before fetch");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if status.status_of(&message) == ProcessingStatus::Unseen {
                outcome.messages.push(message);
            }
        }

        tracing::debug!(
            listed = outcome.listed,
            fetched = outcome.messages.len(),
            "scan finished"
        );
        Ok(outcome)
    }

    /// Moves the cursor past a fully processed page.
    ///
    /// Clears it when there is no further page. A no-op in label mode.
    pub async fn advance(&self, next_page_token: Option<&str>) -> Result<(), ScanError> {
        let Some(store) = self.cursor_store() else {
            return Ok(());
        };
        match next_page_token {
            Some(token) => store.save(&ScanCursor::new(token)).await?,
            None => store.clear().await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Header, Headers, LabelId, MessageId};
    use crate::providers::email::{MessagePage, MockMailbox};
    use crate::storage::MemoryProgressStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn status() -> StatusLabels {
        StatusLabels {
            rejection: LabelId::from("L_REJ"),
            scanned: Some(LabelId::from("L_SCAN")),
        }
    }

    fn message(id: &MessageId, labels: &[&str]) -> Message {
        Message::from_headers(
            id.clone(),
            Headers::new(vec![Header::new("Subject", "Your application")]),
            "snippet",
            labels.iter().map(|l| LabelId::from(*l)).collect(),
        )
    }

    fn ids(names: &[&str]) -> Vec<MessageId> {
        names.iter().map(|n| MessageId::from(*n)).collect()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[test]
    fn query_excludes_status_labels() {
        let settings = Settings::default();
        let query = build_query(&settings);
        assert!(query.starts_with("in:inbox (apply OR application OR "));
        assert!(query.ends_with(r#"-label:"Job Rejection" -label:"Magikmail/Scanned""#));
    }

    #[test]
    fn query_without_scanned_label() {
        let mut settings = Settings::default();
        settings.labels.use_scanned_label = false;
        settings.scan.query_terms = vec!["apply".to_string(), "\"next steps\"".to_string()];
        assert_eq!(
            build_query(&settings),
            r#"in:inbox (apply OR "next steps") -label:"Job Rejection""#
        );
    }

    #[test]
    fn metadata_headers_include_bulk_names() {
        let scanner = Scanner::new(Arc::new(MockMailbox::new()), Arc::new(Settings::default()));
        assert_eq!(
            scanner.metadata_headers(),
            vec![
                "From",
                "Subject",
                "Date",
                "List-Unsubscribe",
                "List-Id",
                "Precedence",
                "Auto-Submitted",
            ]
        );
    }

    #[tokio::test]
    async fn scan_dedupes_and_drops_labeled_messages() {
        let mut mailbox = MockMailbox::new();
        mailbox
            .expect_search()
            .withf(|_, p| p.limit == Some(500) && p.page_token.is_none())
            .times(1)
            .returning(|_, _| {
                Ok(MessagePage {
                    ids: ids(&["a", "b", "a", "c"]),
                    next_page_token: Some("next".to_string()),
                })
            });
        mailbox
            .expect_get_metadata()
            .times(3)
            .returning(|id, _| {
                Ok(match id.as_str() {
                    "b" => message(id, &["L_REJ"]),
                    "c" => message(id, &["L_SCAN"]),
                    _ => message(id, &["INBOX"]),
                })
            });

        let scanner = Scanner::new(Arc::new(mailbox), Arc::new(Settings::default()));
        let outcome = scanner.scan(&status(), far_deadline()).await.unwrap();

        assert_eq!(outcome.listed, 3);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].id.as_str(), "a");
        assert_eq!(outcome.next_page_token.as_deref(), Some("next"));
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn scan_skips_vanished_messages() {
        let mut mailbox = MockMailbox::new();
        mailbox.expect_search().returning(|_, _| {
            Ok(MessagePage {
                ids: ids(&["gone", "here"]),
                next_page_token: None,
            })
        });
        mailbox.expect_get_metadata().returning(|id, _| {
            if id.as_str() == "gone" {
                Err(ProviderError::NotFound("gone".to_string()))
            } else {
                Ok(message(id, &[]))
            }
        });

        let scanner = Scanner::new(Arc::new(mailbox), Arc::new(Settings::default()));
        let outcome = scanner.scan(&status(), far_deadline()).await.unwrap();
        assert_eq!(outcome.messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_stops_at_deadline() {
        let mut mailbox = MockMailbox::new();
        mailbox.expect_search().returning(|_, _| {
            Ok(MessagePage {
                ids: ids(&["a", "b"]),
                next_page_token: None,
            })
        });
        mailbox.expect_get_metadata().never();

        let scanner = Scanner::new(Arc::new(mailbox), Arc::new(Settings::default()));
        let outcome = scanner.scan(&status(), Instant::now()).await.unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.messages.is_empty());
        assert_eq!(outcome.listed, 2);
    }

    #[tokio::test]
    async fn empty_listing_is_exhausted() {
        let mut mailbox = MockMailbox::new();
        mailbox
            .expect_search()
            .returning(|_, _| Ok(MessagePage::default()));

        let scanner = Scanner::new(Arc::new(mailbox), Arc::new(Settings::default()));
        let outcome = scanner.scan(&status(), far_deadline()).await.unwrap();
        assert!(outcome.is_exhausted());
    }

    #[tokio::test]
    async fn cursor_mode_resumes_and_advances() {
        let mut settings = Settings::default();
        settings.labels.use_scanned_label = false;

        let store = Arc::new(MemoryProgressStore::new());
        store.save(&ScanCursor::new("page-2")).await.unwrap();

        let mut mailbox = MockMailbox::new();
        mailbox
            .expect_search()
            .withf(|_, p| p.page_token.as_deref() == Some("page-2"))
            .times(1)
            .returning(|_, _| {
                Ok(MessagePage {
                    ids: vec![],
                    next_page_token: Some("page-3".to_string()),
                })
            });

        let scanner = Scanner::new(Arc::new(mailbox), Arc::new(settings))
            .with_progress(store.clone());
        assert!(scanner.uses_cursor());

        let outcome = scanner
            .scan(
                &StatusLabels {
                    rejection: LabelId::from("L_REJ"),
                    scanned: None,
                },
                far_deadline(),
            )
            .await
            .unwrap();

        scanner.advance(outcome.next_page_token.as_deref()).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().page_token, "page-3");

        scanner.advance(None).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn label_mode_ignores_cursor() {
        let store = Arc::new(MemoryProgressStore::new());
        store.save(&ScanCursor::new("stale")).await.unwrap();

        let mut mailbox = MockMailbox::new();
        mailbox
            .expect_search()
            .withf(|_, p| p.page_token.is_none())
            .returning(|_, _| Ok(MessagePage::default()));

        let scanner = Scanner::new(Arc::new(mailbox), Arc::new(Settings::default()))
            .with_progress(store.clone());
        assert!(!scanner.uses_cursor());
        scanner.scan(&status(), far_deadline()).await.unwrap();
        scanner.advance(Some("x")).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().page_token, "stale");
    }
}
