//! Status command implementation
//!
//! Lists recorded submissions from the configured store.

use super::{load_or_report, open_store, report};
use crate::core::tracker::BatchStatus;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter by status (pending, processing, done, expired_window, requires_cdc, error, not_queued)
    #[arg(long)]
    pub status: Option<String>,

    /// Show only submissions that are still being polled
    #[arg(long)]
    pub pending_only: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Listing submissions");

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let filter = match self.status.as_deref().map(str::parse::<BatchStatus>) {
            Some(Ok(s)) => Some(s),
            Some(Err(e)) => {
                println!("❌ {e}");
                return Ok(3);
            }
            None => None,
        };

        let store = match open_store(&config).await {
            Ok(s) => s,
            Err(e) => return Ok(report("Failed to open submission store", &e)),
        };

        let submissions = match store.list().await {
            Ok(s) => s,
            Err(e) => return Ok(report("Failed to load submissions", &e)),
        };

        let max_attempts = config.tracker.max_error_attempts;
        let filtered: Vec<_> = submissions
            .iter()
            .filter(|s| filter.map_or(true, |f| s.status() == f))
            .filter(|s| !self.pending_only || s.is_pollable(max_attempts))
            .collect();

        if filtered.is_empty() {
            println!("No submissions found.");
            return Ok(0);
        }

        println!("📊 {} submission(s)", filtered.len());
        println!();
        println!(
            "{:<17} {:<16} {:<15} {:<5} {:<6} {:<20}",
            "Submission", "Tracking", "Status", "Docs", "Tries", "Last Checked"
        );
        println!("{}", "-".repeat(84));

        for submission in filtered {
            let checked = submission
                .last_checked_at()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Never".to_string());
            println!(
                "{:<17} {:<16} {:<15} {:<5} {:<6} {:<20}",
                submission.submission_id.as_str(),
                submission
                    .tracking_number
                    .as_ref()
                    .map_or("-", |t| t.as_str()),
                submission.status().as_str(),
                submission.cdcs.len(),
                submission.attempts(),
                checked
            );
            if let Some(message) = &submission.last_message {
                println!("    {} {message}", submission.last_code.as_deref().unwrap_or(""));
            }
        }

        println!();
        Ok(0)
    }
}
