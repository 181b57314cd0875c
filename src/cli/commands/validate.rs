//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Ekuatia configuration file.

use crate::adapters::sifen::SifenEndpoints;
use crate::config::{load_config, StorageTarget};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // Loading runs the full validation
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let endpoints = SifenEndpoints::resolve(config.environment, &config.sifen.endpoints);

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Certificate: {}", config.certificate.path);
        println!("  Format Version: {}", config.sifen.version);
        println!("  Submit Endpoint: {}", endpoints.submit_batch);
        println!("  Batch Query Endpoint: {}", endpoints.query_batch);
        println!("  Taxpayer Query Endpoint: {}", endpoints.query_taxpayer);
        println!("  Document Query Endpoint: {}", endpoints.query_document);
        println!(
            "  Timeouts: connect {}s, request {}s",
            config.sifen.connect_timeout_seconds, config.sifen.timeout_seconds
        );
        if config.sifen.bypass_taxpayer_check {
            println!("  ⚠️  Taxpayer check bypassed");
        }
        println!(
            "  Max Documents per Batch: {}",
            config.submission.max_documents_per_batch
        );
        println!("  Artifacts: {}", config.submission.artifacts_dir);
        println!(
            "  Poll Interval: {}s",
            config.tracker.poll_interval_seconds
        );

        match config.storage.target {
            StorageTarget::Memory => println!("  Storage: memory"),
            StorageTarget::File => println!("  Storage: file ({})", config.storage.path),
            StorageTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.storage.postgresql {
                    use secrecy::ExposeSecret;
                    let connection: &str = pg_config.connection_string.expose_secret().as_ref();
                    println!(
                        "  Storage: PostgreSQL ({})",
                        connection.split('@').next_back().unwrap_or("***")
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
        }
        println!();
        Ok(0)
    }
}
