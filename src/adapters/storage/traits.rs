//! Submission store abstraction
//!
//! The write contract is create-once records plus status-only updates. A
//! record is never deleted, and nothing but a tracker-built
//! [`StatusUpdate`] changes its status or attempt counter.

use crate::core::tracker::{BatchSubmission, DocumentRecord, StatusUpdate};
use crate::domain::{Cdc, Result, SubmissionId};
use async_trait::async_trait;

/// Persistence for batch submissions and signed documents
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Stores a new submission
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::Storage` if a record with the same submission
    /// id already exists.
    async fn create(&self, submission: &BatchSubmission) -> Result<()>;

    /// Applies a status change and returns the updated record
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::Storage` if the record does not exist or its
    /// stored status is no longer `update.from()`.
    async fn update_status(&self, update: &StatusUpdate) -> Result<BatchSubmission>;

    /// Looks up one submission
    async fn get(&self, submission_id: &SubmissionId) -> Result<Option<BatchSubmission>>;

    /// All submissions, oldest first
    async fn list(&self) -> Result<Vec<BatchSubmission>>;

    /// Submissions a scheduled poll should query, oldest first
    async fn list_pollable(&self, max_error_attempts: u32) -> Result<Vec<BatchSubmission>>;

    /// Stores a signed document
    ///
    /// Saving the same CDC again is accepted only with identical content.
    async fn save_document(&self, document: &DocumentRecord) -> Result<()>;

    /// Looks up a signed document
    async fn get_document(&self, cdc: &Cdc) -> Result<Option<DocumentRecord>>;
}
