//! Resolve command implementation

use super::{load_or_report, open_identity, open_store, open_transport, report};
use crate::core::tracker::{BatchStatus, BatchStatusTracker};
use crate::domain::SubmissionId;
use clap::Args;

/// Arguments for the resolve command
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Submission in `requires_cdc`
    pub submission_id: String,
}

impl ResolveArgs {
    /// Execute the resolve command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        let id = match SubmissionId::new(self.submission_id.as_str()) {
            Ok(id) => id,
            Err(e) => {
                println!("❌ {e}");
                return Ok(3);
            }
        };

        let identity = match open_identity(&config) {
            Ok(i) => i,
            Err(e) => return Ok(report("Failed to load certificate", &e)),
        };
        let transport = match open_transport(&config, &identity) {
            Ok(t) => t,
            Err(e) => return Ok(report("Failed to create SIFEN client", &e)),
        };
        let store = match open_store(&config).await {
            Ok(s) => s,
            Err(e) => return Ok(report("Failed to open submission store", &e)),
        };
        let tracker = BatchStatusTracker::new(transport, store.clone(), &config.tracker);

        match tracker.resolve_by_cdc(&id).await {
            Ok(BatchStatus::Done) => {
                println!("✅ {id}: every document was found");
                Ok(0)
            }
            Ok(status) => {
                let message = store
                    .get(&id)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|r| r.last_message)
                    .unwrap_or_default();
                println!("⚠️  {id}: {status} {message}");
                Ok(0)
            }
            Err(e) => Ok(report("Resolution failed", &e)),
        }
    }
}
