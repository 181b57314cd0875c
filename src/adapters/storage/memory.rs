//! In-process submission store

use super::traits::SubmissionStore;
use crate::core::tracker::{BatchSubmission, DocumentRecord, StatusUpdate};
use crate::domain::{Cdc, EkuatiaError, Result, SubmissionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Store contents, shared by the memory and file backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    #[serde(default)]
    pub submissions: BTreeMap<SubmissionId, BatchSubmission>,
    #[serde(default)]
    pub documents: BTreeMap<String, DocumentRecord>,
}

impl StoreState {
    pub fn create(&mut self, submission: &BatchSubmission) -> Result<()> {
        if self.submissions.contains_key(&submission.submission_id) {
            return Err(EkuatiaError::Storage(format!(
                "submission {} already exists",
                submission.submission_id
            )));
        }
        self.submissions
            .insert(submission.submission_id.clone(), submission.clone());
        Ok(())
    }

    pub fn update_status(&mut self, update: &StatusUpdate) -> Result<BatchSubmission> {
        let record = self
            .submissions
            .get_mut(update.submission_id())
            .ok_or_else(|| {
                EkuatiaError::Storage(format!("submission {} not found", update.submission_id()))
            })?;
        if record.status() != update.from() {
            return Err(EkuatiaError::Storage(format!(
                "submission {} is '{}', expected '{}'",
                update.submission_id(),
                record.status(),
                update.from()
            )));
        }
        update.apply_to(record);
        Ok(record.clone())
    }

    pub fn list(&self) -> Vec<BatchSubmission> {
        let mut all: Vec<BatchSubmission> = self.submissions.values().cloned().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.submission_id.cmp(&b.submission_id))
        });
        all
    }

    pub fn save_document(&mut self, document: &DocumentRecord) -> Result<()> {
        match self.documents.get(document.cdc.as_str()) {
            Some(existing) if existing.signed_xml == document.signed_xml => Ok(()),
            Some(_) => Err(EkuatiaError::Storage(format!(
                "document {} is already stored with different content",
                document.cdc
            ))),
            None => {
                self.documents
                    .insert(document.cdc.as_str().to_string(), document.clone());
                Ok(())
            }
        }
    }
}

/// Store kept in memory, lost when the process exits
#[derive(Debug, Default)]
pub struct MemorySubmissionStore {
    state: RwLock<StoreState>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, submission: &BatchSubmission) -> Result<()> {
        self.state.write().await.create(submission)
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<BatchSubmission> {
        self.state.write().await.update_status(update)
    }

    async fn get(&self, submission_id: &SubmissionId) -> Result<Option<BatchSubmission>> {
        Ok(self.state.read().await.submissions.get(submission_id).cloned())
    }

    async fn list(&self) -> Result<Vec<BatchSubmission>> {
        Ok(self.state.read().await.list())
    }

    async fn list_pollable(&self, max_error_attempts: u32) -> Result<Vec<BatchSubmission>> {
        Ok(self
            .state
            .read()
            .await
            .list()
            .into_iter()
            .filter(|s| s.is_pollable(max_error_attempts))
            .collect())
    }

    async fn save_document(&self, document: &DocumentRecord) -> Result<()> {
        self.state.write().await.save_document(document)
    }

    async fn get_document(&self, cdc: &Cdc) -> Result<Option<DocumentRecord>> {
        Ok(self.state.read().await.documents.get(cdc.as_str()).cloned())
    }
}
