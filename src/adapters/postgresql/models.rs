//! PostgreSQL row models
//!
//! Column-level mirrors of the `batch_submissions` and `signed_documents`
//! tables and their conversions to domain records.

use crate::config::Environment;
use crate::core::tracker::{BatchStatus, BatchSubmission, DocumentRecord, StoredSubmission};
use crate::domain::{Cdc, EkuatiaError, Result, SubmissionId, TrackingNumber};
use chrono::{DateTime, Utc};
use tokio_postgres::Row;

/// Row of `batch_submissions`
#[derive(Debug, Clone)]
pub struct PostgreSQLSubmission {
    pub submission_id: String,
    pub tracking_number: Option<String>,
    pub environment: String,
    pub cdcs: Vec<String>,
    pub status: String,
    pub attempts: i32,
    pub error_attempts: i32,
    pub last_code: Option<String>,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl PostgreSQLSubmission {
    pub fn from_domain(submission: &BatchSubmission) -> Self {
        Self {
            submission_id: submission.submission_id.to_string(),
            tracking_number: submission.tracking_number.as_ref().map(ToString::to_string),
            environment: submission.environment.as_str().to_string(),
            cdcs: submission.cdcs.iter().map(ToString::to_string).collect(),
            status: submission.status().as_str().to_string(),
            attempts: i32::try_from(submission.attempts()).unwrap_or(i32::MAX),
            error_attempts: i32::try_from(submission.error_attempts()).unwrap_or(i32::MAX),
            last_code: submission.last_code.clone(),
            last_message: submission.last_message.clone(),
            created_at: submission.created_at,
            last_checked_at: submission.last_checked_at(),
        }
    }

    pub fn from_row(row: &Row) -> Self {
        Self {
            submission_id: row.get("submission_id"),
            tracking_number: row.get("tracking_number"),
            environment: row.get("environment"),
            cdcs: row.get("cdcs"),
            status: row.get("status"),
            attempts: row.get("attempts"),
            error_attempts: row.get("error_attempts"),
            last_code: row.get("last_code"),
            last_message: row.get("last_message"),
            created_at: row.get("created_at"),
            last_checked_at: row.get("last_checked_at"),
        }
    }

    /// Converts back to the domain record, validating every column
    pub fn into_domain(self) -> Result<BatchSubmission> {
        let corrupt = |what: &str, detail: String| {
            EkuatiaError::Storage(format!(
                "row {} has an invalid {what}: {detail}",
                self.submission_id
            ))
        };

        let submission_id =
            SubmissionId::new(&self.submission_id).map_err(|e| corrupt("submission_id", e))?;
        let tracking_number = self
            .tracking_number
            .as_deref()
            .map(TrackingNumber::new)
            .transpose()
            .map_err(|e| corrupt("tracking_number", e))?;
        let environment: Environment =
            self.environment.parse().map_err(|e| corrupt("environment", e))?;
        let cdcs = self
            .cdcs
            .iter()
            .map(Cdc::new)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| corrupt("cdc", e))?;
        let status: BatchStatus = self.status.parse().map_err(|e| corrupt("status", e))?;
        let attempts =
            u32::try_from(self.attempts).map_err(|e| corrupt("attempts", e.to_string()))?;
        let error_attempts = u32::try_from(self.error_attempts)
            .map_err(|e| corrupt("error_attempts", e.to_string()))?;

        Ok(StoredSubmission {
            submission_id,
            tracking_number,
            environment,
            cdcs,
            status,
            attempts,
            error_attempts,
            last_code: self.last_code,
            last_message: self.last_message,
            created_at: self.created_at,
            last_checked_at: self.last_checked_at,
        }
        .into())
    }
}

/// Converts a `signed_documents` row
pub fn document_from_row(row: &Row) -> Result<DocumentRecord> {
    let cdc: String = row.get("cdc");
    let environment: String = row.get("environment");
    Ok(DocumentRecord {
        cdc: Cdc::new(&cdc)
            .map_err(|e| EkuatiaError::Storage(format!("invalid stored CDC: {e}")))?,
        signed_xml: row.get("signed_xml"),
        passthrough: row.get("passthrough"),
        environment: environment
            .parse()
            .map_err(|e: String| EkuatiaError::Storage(format!("document {cdc}: {e}")))?,
        created_at: row.get("created_at"),
    })
}
