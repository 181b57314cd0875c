//! Submission store factory
//!
//! Builds the store selected by `[storage] target`.

use super::file::FileSubmissionStore;
use super::memory::MemorySubmissionStore;
use super::traits::SubmissionStore;
use crate::adapters::postgresql::{PostgreSQLAdapter, PostgreSQLClient};
use crate::config::{StorageConfig, StorageTarget};
use crate::domain::{EkuatiaError, Result};
use std::sync::Arc;

/// Create the submission store for `config`
///
/// The PostgreSQL backend checks the connection and applies the schema
/// migration before it is returned.
///
/// # Errors
///
/// Returns an error if the store cannot be opened.
pub async fn create_submission_store(config: &StorageConfig) -> Result<Arc<dyn SubmissionStore>> {
    match config.target {
        StorageTarget::Memory => {
            tracing::info!("Creating in-memory submission store");
            Ok(Arc::new(MemorySubmissionStore::new()))
        }
        StorageTarget::File => {
            tracing::info!(path = %config.path, "Creating file submission store");
            Ok(Arc::new(FileSubmissionStore::open(&config.path)?))
        }
        StorageTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                EkuatiaError::Configuration(
                    "storage.postgresql configuration is required when target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL submission store");
            let client = PostgreSQLClient::new(pg_config.clone())?;
            client.test_connection().await?;
            client.ensure_schema().await?;
            Ok(Arc::new(PostgreSQLAdapter::new(client)))
        }
    }
}
