//! Send command implementation
//!
//! Runs the submission pipeline on the given documents and prints the
//! recorded submission.

use super::{load_or_report, open_identity, open_store, open_transport, report};
use crate::core::pipeline::{SubmissionOutcome, SubmissionPipeline};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the send command
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Documents to submit as one batch, in order
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Treat the single input as a ready `rLoteDE` of signed documents
    #[arg(long)]
    pub envelope: bool,

    /// Sign, package and preflight without sending
    #[arg(long)]
    pub dry_run: bool,
}

impl SendArgs {
    /// Execute the send command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let mut config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
        if self.envelope && self.inputs.len() != 1 {
            println!("❌ --envelope takes exactly one batch file");
            return Ok(2);
        }

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
        let pipeline = match SubmissionPipeline::from_config(&config, identity, transport, store) {
            Ok(p) => p,
            Err(e) => return Ok(report("Failed to create pipeline", &e)),
        };

        let inputs = self
            .inputs
            .iter()
            .map(std::fs::read)
            .collect::<std::io::Result<Vec<_>>>()?;

        println!(
            "📤 Submitting {} document(s) to {}",
            inputs.len(),
            config.environment
        );
        let result = if self.envelope {
            pipeline.submit_envelope(&inputs[0]).await
        } else {
            pipeline.submit_documents(&inputs).await
        };

        match result {
            Ok(SubmissionOutcome::Queued(record)) => {
                println!("✅ Batch queued");
                println!("   Submission: {}", record.submission_id);
                if let Some(tracking) = &record.tracking_number {
                    println!("   Tracking number: {tracking}");
                }
                for cdc in &record.cdcs {
                    println!("   CDC: {cdc}");
                }
                Ok(0)
            }
            Ok(SubmissionOutcome::NotQueued(record)) => {
                println!("⚠️  Batch was not queued");
                println!("   Submission: {}", record.submission_id);
                println!(
                    "   {} {}",
                    record.last_code.as_deref().unwrap_or_default(),
                    record.last_message.as_deref().unwrap_or_default()
                );
                Ok(3)
            }
            Ok(SubmissionOutcome::DryRun {
                submission_id,
                cdcs,
                artifacts_dir,
            }) => {
                println!("🔍 DRY RUN - preflight passed, nothing was sent");
                println!("   Submission: {submission_id}");
                println!("   Documents: {}", cdcs.len());
                if let Some(dir) = artifacts_dir {
                    println!("   Artifacts: {}", dir.display());
                }
                Ok(0)
            }
            Err(e) => Ok(report("Submission failed", &e)),
        }
    }
}
