//! Keychain access for secure credential storage.
//!
//! Wraps the keyring crate to provide OS-native storage for the Gmail OAuth
//! credentials and the inference API key.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Keychain failures.
#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("keyring backend failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("credential {key} is not valid JSON: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("keyring task did not complete: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, KeychainError>;

/// Secrets in the OS keychain, namespaced by service name so test runs
/// never touch the credentials a real sweep uses.
#[derive(Debug, Clone)]
pub struct KeychainAccess {
    service_name: String,
}

impl KeychainAccess {
    /// Service name used outside tests.
    pub const DEFAULT_SERVICE: &'static str = "dev.rejection-sorter";

    /// Key under which the Gmail OAuth credentials are stored as JSON.
    pub const GMAIL_CREDENTIALS_KEY: &'static str = "gmail.oauth";

    pub fn new() -> Self {
        Self {
            service_name: Self::DEFAULT_SERVICE.to_string(),
        }
    }

    pub fn with_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Stores a secret, overwriting any existing value.
    pub async fn store(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.on_entry(key, move |entry| Ok(entry.set_password(&value)?))
            .await
    }

    /// Reads a secret; `None` when nothing is stored under `key`.
    pub async fn retrieve(&self, key: &str) -> Result<Option<String>> {
        self.on_entry(key, |entry| match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    /// Keyring calls block on the platform secret service, so they run off
    /// the async workers.
    async fn on_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&keyring::Entry) -> Result<T> + Send + 'static,
    {
        let service = self.service_name.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || op(&keyring::Entry::new(&service, &key)?))
            .await
            .map_err(|e| KeychainError::TaskFailed(e.to_string()))?
    }

    /// Stores a structured credential as JSON.
    pub async fn store_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).map_err(|source| KeychainError::Malformed {
            key: key.to_string(),
            source,
        })?;
        self.store(key, &json).await
    }

    /// Retrieves a structured credential stored with [`store_json`](Self::store_json).
    pub async fn retrieve_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.retrieve(key).await? {
            Some(json) => decode_json(key, &json).map(Some),
            None => Ok(None),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

fn decode_json<T: DeserializeOwned>(key: &str, json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|source| KeychainError::Malformed {
        key: key.to_string(),
        source,
    })
}

impl Default for KeychainAccess {
    fn default() -> Self {
        Self::new()
    }
}
