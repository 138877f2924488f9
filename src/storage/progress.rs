//! Persisted scan cursor.
//!
//! Only consulted when the hidden scanned marker is disabled; otherwise
//! label membership alone records progress.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::domain::ScanCursor;

/// Errors raised by a progress store.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("progress file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("progress file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage for the explicit scan cursor.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Returns the saved cursor, if any.
    async fn load(&self) -> Result<Option<ScanCursor>, ProgressError>;

    /// Replaces the saved cursor.
    async fn save(&self, cursor: &ScanCursor) -> Result<(), ProgressError>;

    /// Forgets the saved cursor so the next scan starts from the first page.
    async fn clear(&self) -> Result<(), ProgressError>;
}

/// Cursor kept as a small JSON file.
#[derive(Debug, Clone)]
pub struct JsonProgressStore {
    path: PathBuf,
}

impl JsonProgressStore {
    /// File name used inside the data directory.
    pub const FILE_NAME: &'static str = "progress.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the platform data directory, e.g. `~/.local/share/rejection-sorter`.
    pub fn in_data_dir() -> Option<Self> {
        directories::ProjectDirs::from("dev", "rejection-sorter", "rejection-sorter")
            .map(|dirs| Self::new(dirs.data_dir().join(Self::FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ProgressError {
        ProgressError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ProgressStore for JsonProgressStore {
    async fn load(&self) -> Result<Option<ScanCursor>, ProgressError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| ProgressError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    async fn save(&self, cursor: &ScanCursor) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(cursor).map_err(|source| ProgressError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        // Write-then-rename so a crash never leaves a truncated cursor behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    async fn clear(&self) -> Result<(), ProgressError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-process cursor, for tests and for runs that never persist.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    cursor: Mutex<Option<ScanCursor>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self) -> Result<Option<ScanCursor>, ProgressError> {
        Ok(self.cursor.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(&self, cursor: &ScanCursor) -> Result<(), ProgressError> {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = Some(cursor.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ProgressError> {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProgressStore::new(dir.path().join("nested").join("progress.json"));

        assert_eq!(store.load().await.unwrap(), None);

        let cursor = ScanCursor::new("page-2");
        store.save(&cursor).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(cursor));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProgressStore::new(dir.path().join("progress.json"));
        store.clear().await.unwrap();
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn json_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{").unwrap();

        let store = JsonProgressStore::new(&path);
        assert!(matches!(store.load().await, Err(ProgressError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryProgressStore::new();
        store.save(&ScanCursor::new("t1")).await.unwrap();
        assert_eq!(store.load().await.unwrap().map(|c| c.page_token), Some("t1".to_string()));
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
