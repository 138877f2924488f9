//! Gmail API mailbox implementation.
//!
//! This module provides a [`Mailbox`] implementation using the Gmail REST API.
//!
//! # Authentication
//!
//! Gmail uses OAuth 2.0. The mailbox is constructed with a refresh token plus
//! client credentials and exchanges them for an access token in
//! [`GmailMailbox::authenticate`]. Loading credentials from the keychain or
//! the environment is the caller's job.
//!
//! # API Usage
//!
//! - `users.messages.list` for query search
//! - `users.messages.get` with `format=metadata` for headers and snippet
//! - `users.labels.list` / `users.labels.create` for label management
//! - `users.messages.batchModify` for bulk labeling

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{
    LabelChange, Mailbox, MessagePage, Pagination, ProviderError, Result, MAX_IDS_PER_MODIFY,
};
use crate::domain::{
    Header, Headers, Label, LabelId, LabelListVisibility, LabelVisibility, Message, MessageId,
    MessageListVisibility, ThreadId,
};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Assumed token lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Refresh this long before the token actually expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<GmailMessageRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageRef {
    id: String,
}

/// Gmail API message, as returned with `format=metadata`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    payload: Option<GmailMessagePayload>,
    internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailMessagePayload {
    headers: Option<Vec<GmailHeader>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail API label.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailLabel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    label_type: Option<String>,
    message_list_visibility: Option<MessageListVisibility>,
    label_list_visibility: Option<LabelListVisibility>,
}

impl From<GmailLabel> for Label {
    fn from(l: GmailLabel) -> Self {
        let visibility = match (l.label_list_visibility, l.message_list_visibility) {
            (Some(label_list_visibility), Some(message_list_visibility)) => Some(LabelVisibility {
                label_list_visibility,
                message_list_visibility,
            }),
            _ => None,
        };
        Label {
            id: LabelId::from(l.id),
            name: l.name,
            visibility,
            is_system: l.label_type.as_deref() == Some("system"),
        }
    }
}

/// Gmail labels list response.
#[derive(Debug, Deserialize)]
struct LabelsListResponse {
    labels: Option<Vec<GmailLabel>>,
}

/// Gmail label create request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest<'a> {
    name: &'a str,
    #[serde(flatten)]
    visibility: LabelVisibility,
}

/// Gmail batchModify request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchModifyRequest<'a> {
    ids: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: Vec<&'a str>,
}

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Access token with its expiry.
#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_stale(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN >= self.expires_at
    }
}

/// OAuth credentials for the Gmail API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailCredentials {
    /// OAuth refresh token.
    pub refresh_token: String,
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

/// Gmail API mailbox.
///
/// # Example
///
/// ```ignore
/// use rejection_sorter::providers::email::{GmailMailbox, Mailbox, Pagination};
///
/// let mailbox = GmailMailbox::new(credentials);
/// mailbox.authenticate().await?;
///
/// let page = mailbox.search("in:inbox", Pagination::with_limit(50)).await?;
/// ```
pub struct GmailMailbox {
    /// HTTP client for API requests.
    client: reqwest::Client,
    /// OAuth credentials.
    credentials: GmailCredentials,
    /// Current OAuth access token, refreshed shortly before it expires.
    access_token: RwLock<Option<AccessToken>>,
}

impl GmailMailbox {
    /// Creates a new mailbox. It is not usable until [`authenticate`](Self::authenticate) succeeds.
    pub fn new(credentials: GmailCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            access_token: RwLock::new(None),
        }
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Returns whether an access token has been obtained.
    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    /// Exchanges the refresh token for an access token.
    ///
    /// Must be called once before use; later refreshes happen on demand.
    pub async fn authenticate(&self) -> Result<()> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Authentication(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse token response: {}", e)))?;

        let lifetime = token_response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        *self.access_token.write().await = Some(AccessToken {
            value: token_response.access_token,
            expires_at: Instant::now() + lifetime,
        });
        tracing::info!(expires_in_secs = lifetime.as_secs(), "Gmail mailbox authenticated");
        Ok(())
    }

    /// Returns a usable access token, refreshing it if it is about to expire.
    async fn current_token(&self) -> Result<String> {
        let cached = self.access_token.read().await.clone();
        match cached {
            None => Err(ProviderError::Authentication(
                "not authenticated".to_string(),
            )),
            Some(token) if token.is_stale() => {
                tracing::debug!("refreshing Gmail access token");
                self.authenticate().await?;
                self.access_token
                    .read()
                    .await
                    .as_ref()
                    .map(|t| t.value.clone())
                    .ok_or_else(|| {
                        ProviderError::Authentication("token refresh failed".to_string())
                    })
            }
            Some(token) => Ok(token.value),
        }
    }

    /// Builds authorization headers for API requests.
    async fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self.current_token().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request to the Gmail API.
    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let headers = self.auth_headers().await?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        Self::handle_response(response).await
    }

    /// Makes an authenticated POST request to the Gmail API.
    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send_post(endpoint, body).await?;
        Self::handle_response(response).await
    }

    /// Makes an authenticated POST request that doesn't return a body.
    async fn post_no_response<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<()> {
        let response = self.send_post(endpoint, body).await?;
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        Ok(())
    }

    async fn send_post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let mut headers = self.auth_headers().await?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        self.client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))
    }

    /// Handles API response, checking for errors.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse response: {}", e)))
    }

    /// Handles API error responses.
    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();
        Self::error_from_status(status, retry_after_secs, body)
    }

    /// Maps an HTTP status and body onto a [`ProviderError`].
    ///
    /// Gmail reports per-user quota exhaustion as 403 with a `rateLimitExceeded`
    /// style reason, so those count as rate limiting too.
    fn error_from_status(
        status: u16,
        retry_after_secs: Option<u64>,
        body: String,
    ) -> ProviderError {
        let quota_exceeded = body.contains("rateLimitExceeded")
            || body.contains("userRateLimitExceeded")
            || body.contains("quotaExceeded")
            || body.contains("dailyLimitExceeded");

        match status {
            401 => ProviderError::Authentication(format!("unauthorized: {}", body)),
            404 => ProviderError::NotFound(body),
            429 => ProviderError::RateLimited { retry_after_secs },
            403 if quota_exceeded => ProviderError::RateLimited { retry_after_secs },
            400 => ProviderError::InvalidRequest(body),
            500..=599 => ProviderError::Connection(format!("server error ({}): {}", status, body)),
            _ => ProviderError::Internal(format!("API error ({}): {}", status, body)),
        }
    }

    /// Converts a Gmail message to the domain [`Message`].
    fn gmail_message_to_message(msg: GmailMessage) -> Message {
        let headers: Headers = msg
            .payload
            .and_then(|p| p.headers)
            .unwrap_or_default()
            .into_iter()
            .map(|h| Header::new(h.name, h.value))
            .collect();

        let label_ids = msg
            .label_ids
            .unwrap_or_default()
            .into_iter()
            .map(LabelId::from)
            .collect();

        let mut message = Message::from_headers(
            MessageId::from(msg.id),
            headers,
            msg.snippet.unwrap_or_default(),
            label_ids,
        );
        message.thread_id = msg.thread_id.map(ThreadId::from);
        message.internal_date = msg
            .internal_date
            .as_deref()
            .and_then(|d| d.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis);
        message
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn search(&self, query: &str, pagination: Pagination) -> Result<MessagePage> {
        let limit = pagination.limit.unwrap_or(100).to_string();
        let mut params = vec![("q", query), ("maxResults", limit.as_str())];
        if let Some(token) = pagination.page_token.as_deref() {
            params.push(("pageToken", token));
        }

        let response: MessageListResponse = self.get("/messages", &params).await?;

        Ok(MessagePage {
            ids: response
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|m| MessageId::from(m.id))
                .collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn get_metadata(&self, id: &MessageId, headers: &[String]) -> Result<Message> {
        let mut params = vec![("format", "metadata")];
        params.extend(headers.iter().map(|h| ("metadataHeaders", h.as_str())));

        let endpoint = format!("/messages/{}", id);
        let response: GmailMessage = self.get(&endpoint, &params).await?;
        Ok(Self::gmail_message_to_message(response))
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let response: LabelsListResponse = self.get("/labels", &[]).await?;
        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(Label::from)
            .collect())
    }

    async fn create_label(&self, name: &str, visibility: LabelVisibility) -> Result<Label> {
        let body = CreateLabelRequest { name, visibility };
        let created: GmailLabel = self.post("/labels", &body).await?;
        tracing::info!(label = %created.name, id = %created.id, "Created label");
        Ok(created.into())
    }

    async fn batch_modify(&self, ids: &[MessageId], change: &LabelChange) -> Result<()> {
        if ids.len() > MAX_IDS_PER_MODIFY {
            return Err(ProviderError::InvalidRequest(format!(
                "batchModify accepts at most {} ids, got {}",
                MAX_IDS_PER_MODIFY,
                ids.len()
            )));
        }

        let body = BatchModifyRequest {
            ids: ids.iter().map(MessageId::as_str).collect(),
            add_label_ids: change.add.iter().map(LabelId::as_str).collect(),
            remove_label_ids: change.remove.iter().map(LabelId::as_str).collect(),
        };

        self.post_no_response("/messages/batchModify", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> GmailCredentials {
        GmailCredentials {
            refresh_token: "refresh".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn gmail_mailbox_creation() {
        let mailbox = GmailMailbox::new(credentials());
        assert!(!mailbox.is_authenticated().await);
    }

    #[test]
    fn access_token_staleness() {
        let fresh = AccessToken {
            value: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(!fresh.is_stale());

        let expiring = AccessToken {
            value: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(expiring.is_stale());
    }

    #[tokio::test]
    async fn gmail_mailbox_requires_auth() {
        let mailbox = GmailMailbox::new(credentials());

        let result = mailbox.search("in:inbox", Pagination::with_limit(1)).await;
        assert!(matches!(result, Err(ProviderError::Authentication(_))));
    }

    #[tokio::test]
    async fn batch_modify_rejects_oversized_batches() {
        let mailbox = GmailMailbox::new(credentials());
        let ids: Vec<MessageId> = (0..=MAX_IDS_PER_MODIFY)
            .map(|i| MessageId::from(format!("m{i}")))
            .collect();

        let result = mailbox
            .batch_modify(&ids, &LabelChange::add(LabelId::from("Label_1")))
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn metadata_message_conversion() {
        let json = r#"{
            "id": "18c2",
            "threadId": "18c1",
            "labelIds": ["INBOX", "UNREAD"],
            "snippet": "We regret to inform you",
            "internalDate": "1717408800000",
            "payload": {
                "headers": [
                    {"name": "From", "value": "Acme Careers <careers@acme.example>"},
                    {"name": "Subject", "value": "Your application to Acme"},
                    {"name": "Date", "value": "Mon, 3 Jun 2024 10:00:00 +0000"},
                    {"name": "List-Unsubscribe", "value": "<mailto:u@acme.example>"}
                ]
            }
        }"#;

        let raw: GmailMessage = serde_json::from_str(json).unwrap();
        let message = GmailMailbox::gmail_message_to_message(raw);

        assert_eq!(message.id, MessageId::from("18c2"));
        assert_eq!(message.thread_id, Some(ThreadId::from("18c1")));
        assert_eq!(message.subject, "Your application to Acme");
        assert_eq!(message.from, "Acme Careers <careers@acme.example>");
        assert_eq!(message.snippet, "We regret to inform you");
        assert!(message.headers.get("list-unsubscribe").is_some());
        assert!(message.has_label(&LabelId::from("UNREAD")));
        assert_eq!(
            message.internal_date.map(|d| d.timestamp_millis()),
            Some(1_717_408_800_000)
        );
    }

    #[test]
    fn message_without_payload() {
        let raw: GmailMessage = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        let message = GmailMailbox::gmail_message_to_message(raw);
        assert!(message.headers.is_empty());
        assert!(message.label_ids.is_empty());
        assert!(message.internal_date.is_none());
    }

    #[test]
    fn label_conversion() {
        let json = r#"{"labels": [
            {"id": "INBOX", "name": "INBOX", "type": "system"},
            {"id": "Label_7", "name": "Magikmail/Scanned", "type": "user",
             "labelListVisibility": "labelHide", "messageListVisibility": "hide"}
        ]}"#;

        let response: LabelsListResponse = serde_json::from_str(json).unwrap();
        let labels: Vec<Label> = response.labels.unwrap().into_iter().map(Label::from).collect();

        assert!(labels[0].is_system);
        assert!(labels[0].visibility.is_none());
        assert_eq!(labels[1].name, "Magikmail/Scanned");
        assert_eq!(labels[1].visibility, Some(LabelVisibility::HIDDEN));
    }

    #[test]
    fn create_label_body() {
        let body = CreateLabelRequest {
            name: "Job Rejection",
            visibility: LabelVisibility::VISIBLE,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["name"], "Job Rejection");
        assert_eq!(json["labelListVisibility"], "labelShow");
        assert_eq!(json["messageListVisibility"], "show");
    }

    #[test]
    fn batch_modify_body_omits_empty_removals() {
        let ids = [MessageId::from("a"), MessageId::from("b")];
        let body = BatchModifyRequest {
            ids: ids.iter().map(MessageId::as_str).collect(),
            add_label_ids: vec!["Label_1"],
            remove_label_ids: vec![],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"ids": ["a", "b"], "addLabelIds": ["Label_1"]}));
    }

    #[test]
    fn error_mapping() {
        assert!(matches!(
            GmailMailbox::error_from_status(401, None, "bad token".into()),
            ProviderError::Authentication(_)
        ));
        assert!(matches!(
            GmailMailbox::error_from_status(429, Some(10), String::new()),
            ProviderError::RateLimited {
                retry_after_secs: Some(10)
            }
        ));
        assert!(matches!(
            GmailMailbox::error_from_status(
                403,
                None,
                r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}]}}"#.into()
            ),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            GmailMailbox::error_from_status(403, None, "forbidden".into()),
            ProviderError::Internal(_)
        ));
        assert!(matches!(
            GmailMailbox::error_from_status(503, None, "backend".into()),
            ProviderError::Connection(_)
        ));
    }
}
