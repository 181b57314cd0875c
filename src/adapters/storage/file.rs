//! JSON file submission store

use super::memory::StoreState;
use super::traits::SubmissionStore;
use crate::core::tracker::{BatchSubmission, DocumentRecord, StatusUpdate};
use crate::domain::{Cdc, EkuatiaError, Result, SubmissionId};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Store persisted as one JSON document
///
/// The whole state is rewritten through a temporary file and renamed into
/// place after every change, so a crash never leaves a half-written file.
#[derive(Debug)]
pub struct FileSubmissionStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileSubmissionStore {
    /// Opens the store, starting empty when the file does not exist
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::Storage` if the file exists but cannot be read
    /// or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read(&path).map_err(|e| {
                EkuatiaError::Storage(format!("Failed to read {}: {e}", path.display()))
            })?;
            serde_json::from_slice(&raw).map_err(|e| {
                EkuatiaError::Storage(format!("Corrupt submission store {}: {e}", path.display()))
            })?
        } else {
            StoreState::default()
        };

        tracing::debug!(
            path = %path.display(),
            submissions = state.submissions.len(),
            "Opened file submission store"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(state)?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&json)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| {
            EkuatiaError::Storage(format!("Failed to write {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    /// Applies `change` to a copy and keeps it only if it was written
    async fn mutate<T>(&self, change: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let value = change(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(value)
    }
}

#[async_trait]
impl SubmissionStore for FileSubmissionStore {
    async fn create(&self, submission: &BatchSubmission) -> Result<()> {
        self.mutate(|state| state.create(submission)).await
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<BatchSubmission> {
        self.mutate(|state| state.update_status(update)).await
    }

    async fn get(&self, submission_id: &SubmissionId) -> Result<Option<BatchSubmission>> {
        Ok(self.state.lock().await.submissions.get(submission_id).cloned())
    }

    async fn list(&self) -> Result<Vec<BatchSubmission>> {
        Ok(self.state.lock().await.list())
    }

    async fn list_pollable(&self, max_error_attempts: u32) -> Result<Vec<BatchSubmission>> {
        Ok(self
            .state
            .lock()
            .await
            .list()
            .into_iter()
            .filter(|s| s.is_pollable(max_error_attempts))
            .collect())
    }

    async fn save_document(&self, document: &DocumentRecord) -> Result<()> {
        self.mutate(|state| state.save_document(document)).await
    }

    async fn get_document(&self, cdc: &Cdc) -> Result<Option<DocumentRecord>> {
        Ok(self.state.lock().await.documents.get(cdc.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::domain::TrackingNumber;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/submissions.json");

        let store = FileSubmissionStore::open(&path).unwrap();
        store
            .create(&BatchSubmission::pending(
                SubmissionId::new("250101123456789").unwrap(),
                TrackingNumber::new("123456").unwrap(),
                Environment::Test,
                vec![Cdc::new("01800123456001001000000120250101123456789").unwrap()],
                "0300",
                "Lote recibido",
            ))
            .await
            .unwrap();
        drop(store);

        let reopened = FileSubmissionStore::open(&path).unwrap();
        let all = reopened.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tracking_number.as_ref().unwrap().as_str(), "123456");
        assert_eq!(all[0].cdcs.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_change_is_not_written() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("submissions.json");
        let store = FileSubmissionStore::open(&path).unwrap();
        let record = BatchSubmission::not_queued(
            SubmissionId::new("250101123456789").unwrap(),
            Environment::Test,
            vec![],
            "0301",
            "Lote no encolado",
        );
        store.create(&record).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        assert!(store.create(&record).await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("submissions.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FileSubmissionStore::open(&path).unwrap_err();
        assert!(matches!(err, EkuatiaError::Storage(_)));
    }
}
