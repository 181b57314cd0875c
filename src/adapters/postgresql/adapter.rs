//! PostgreSQL implementation of the submission store

use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{document_from_row, PostgreSQLSubmission};
use crate::adapters::storage::SubmissionStore;
use crate::core::tracker::{BatchSubmission, DocumentRecord, StatusUpdate};
use crate::domain::{Cdc, EkuatiaError, Result, SubmissionId};
use async_trait::async_trait;
use std::sync::Arc;

const SELECT_SUBMISSION: &str = "SELECT submission_id, tracking_number, environment, cdcs, \
     status, attempts, error_attempts, last_code, last_message, created_at, last_checked_at \
     FROM batch_submissions";

/// PostgreSQL-backed [`SubmissionStore`]
///
/// Status updates are conditional on the stored status, so two pollers
/// racing on the same batch cannot both apply a transition.
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    async fn query_submissions(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<BatchSubmission>> {
        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(sql, params)
            .await
            .map_err(|e| EkuatiaError::Storage(format!("Query failed: {e}")))?;
        rows.iter()
            .map(|row| PostgreSQLSubmission::from_row(row).into_domain())
            .collect()
    }
}

#[async_trait]
impl SubmissionStore for PostgreSQLAdapter {
    async fn create(&self, submission: &BatchSubmission) -> Result<()> {
        let row = PostgreSQLSubmission::from_domain(submission);
        let conn = self.client.get_connection().await?;
        let inserted = conn
            .execute(
                "INSERT INTO batch_submissions (submission_id, tracking_number, environment, \
                 cdcs, status, attempts, error_attempts, last_code, last_message, created_at, \
                 last_checked_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (submission_id) DO NOTHING",
                &[
                    &row.submission_id,
                    &row.tracking_number,
                    &row.environment,
                    &row.cdcs,
                    &row.status,
                    &row.attempts,
                    &row.error_attempts,
                    &row.last_code,
                    &row.last_message,
                    &row.created_at,
                    &row.last_checked_at,
                ],
            )
            .await
            .map_err(|e| EkuatiaError::Storage(format!("Failed to insert submission: {e}")))?;

        if inserted == 0 {
            return Err(EkuatiaError::Storage(format!(
                "submission {} already exists",
                row.submission_id
            )));
        }
        tracing::debug!(submission_id = %row.submission_id, status = %row.status, "Inserted submission");
        Ok(())
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<BatchSubmission> {
        let attempts = i32::try_from(update.attempts()).unwrap_or(i32::MAX);
        let error_attempts = i32::try_from(update.error_attempts()).unwrap_or(i32::MAX);
        let conn = self.client.get_connection().await?;
        let row = conn
            .query_opt(
                "UPDATE batch_submissions SET status = $3, attempts = $4, error_attempts = $5, \
                 last_code = $6, last_message = $7, last_checked_at = $8 \
                 WHERE submission_id = $1 AND status = $2 \
                 RETURNING submission_id, tracking_number, environment, cdcs, status, \
                 attempts, error_attempts, last_code, last_message, created_at, last_checked_at",
                &[
                    &update.submission_id().as_str(),
                    &update.from().as_str(),
                    &update.to().as_str(),
                    &attempts,
                    &error_attempts,
                    &update.last_code(),
                    &update.last_message(),
                    &update.checked_at(),
                ],
            )
            .await
            .map_err(|e| EkuatiaError::Storage(format!("Failed to update submission: {e}")))?;

        match row {
            Some(row) => PostgreSQLSubmission::from_row(&row).into_domain(),
            None => Err(EkuatiaError::Storage(format!(
                "submission {} not found in status '{}'",
                update.submission_id(),
                update.from()
            ))),
        }
    }

    async fn get(&self, submission_id: &SubmissionId) -> Result<Option<BatchSubmission>> {
        let sql = format!("{SELECT_SUBMISSION} WHERE submission_id = $1");
        let mut found = self
            .query_submissions(&sql, &[&submission_id.as_str()])
            .await?;
        Ok(found.pop())
    }

    async fn list(&self) -> Result<Vec<BatchSubmission>> {
        let sql = format!("{SELECT_SUBMISSION} ORDER BY created_at, submission_id");
        self.query_submissions(&sql, &[]).await
    }

    async fn list_pollable(&self, max_error_attempts: u32) -> Result<Vec<BatchSubmission>> {
        let limit = i32::try_from(max_error_attempts).unwrap_or(i32::MAX);
        let sql = format!(
            "{SELECT_SUBMISSION} WHERE tracking_number IS NOT NULL \
             AND (status IN ('pending', 'processing') OR (status = 'error' AND error_attempts < $1)) \
             ORDER BY created_at, submission_id"
        );
        self.query_submissions(&sql, &[&limit]).await
    }

    async fn save_document(&self, document: &DocumentRecord) -> Result<()> {
        let conn = self.client.get_connection().await?;
        let inserted = conn
            .execute(
                "INSERT INTO signed_documents (cdc, signed_xml, passthrough, environment, created_at) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (cdc) DO NOTHING",
                &[
                    &document.cdc.as_str(),
                    &document.signed_xml,
                    &document.passthrough,
                    &document.environment.as_str(),
                    &document.created_at,
                ],
            )
            .await
            .map_err(|e| EkuatiaError::Storage(format!("Failed to insert document: {e}")))?;

        if inserted == 0 {
            let existing = self.get_document(&document.cdc).await?;
            if existing.map_or(true, |e| e.signed_xml != document.signed_xml) {
                return Err(EkuatiaError::Storage(format!(
                    "document {} is already stored with different content",
                    document.cdc
                )));
            }
        }
        Ok(())
    }

    async fn get_document(&self, cdc: &Cdc) -> Result<Option<DocumentRecord>> {
        let conn = self.client.get_connection().await?;
        let row = conn
            .query_opt(
                "SELECT cdc, signed_xml, passthrough, environment, created_at \
                 FROM signed_documents WHERE cdc = $1",
                &[&cdc.as_str()],
            )
            .await
            .map_err(|e| EkuatiaError::Storage(format!("Query failed: {e}")))?;
        row.as_ref().map(document_from_row).transpose()
    }
}
