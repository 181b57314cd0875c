//! Poll command implementation
//!
//! Queries one submission, runs one polling round over every pollable
//! submission, or with `--watch` keeps polling on the configured interval
//! until Ctrl+C / SIGTERM.

use super::{load_or_report, open_identity, open_store, open_transport, report};
use crate::core::tracker::BatchStatusTracker;
use crate::domain::SubmissionId;
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the poll command
#[derive(Args, Debug)]
pub struct PollArgs {
    /// Poll only this submission
    #[arg(long, conflicts_with = "watch")]
    pub submission_id: Option<String>,

    /// Keep polling until interrupted
    #[arg(long)]
    pub watch: bool,

    /// Override tracker.poll_interval_seconds
    #[arg(long)]
    pub interval: Option<u64>,
}

impl PollArgs {
    /// Execute the poll command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let submission_id = match self.submission_id.as_deref().map(SubmissionId::new) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                println!("❌ {e}");
                return Ok(3);
            }
            None => None,
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
        let tracker = BatchStatusTracker::new(transport, store, &config.tracker);

        if let Some(id) = submission_id {
            return match tracker.poll_submission(&id).await {
                Ok(status) => {
                    println!("📊 {id}: {status}");
                    Ok(0)
                }
                Err(e) => Ok(report("Polling failed", &e)),
            };
        }

        if self.watch {
            let seconds = self.interval.unwrap_or(config.tracker.poll_interval_seconds).max(1);
            println!("🔄 Polling every {seconds}s, press Ctrl+C to stop");
            tracker
                .run(Duration::from_secs(seconds), shutdown_signal)
                .await;
            return Ok(0);
        }

        match tracker.poll_once().await {
            Ok(summary) => {
                println!(
                    "📊 Polled {} submission(s): {} changed, {} failed",
                    summary.polled, summary.transitioned, summary.errors
                );
                Ok(if summary.errors > 0 { 4 } else { 0 })
            }
            Err(e) => Ok(report("Polling failed", &e)),
        }
    }
}
