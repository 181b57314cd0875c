//! Cert-info command implementation

use super::{load_or_report, open_identity, report};
use clap::Args;

/// Arguments for the cert-info command
#[derive(Args, Debug)]
pub struct CertInfoArgs {}

impl CertInfoArgs {
    /// Execute the cert-info command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let identity = match open_identity(&config) {
            Ok(i) => i,
            Err(e) => return Ok(report("Failed to load certificate", &e)),
        };

        println!("🔐 Certificate: {}", config.certificate.path);
        println!("  Subject: {}", identity.subject());
        println!("  Issuer: {}", identity.issuer());
        println!("  Valid from: {}", identity.not_before());
        println!("  Valid until: {}", identity.not_after());
        match identity.tax_id() {
            Some(ruc) => println!("  RUC: {ruc}"),
            None => println!("  RUC: ⚠️  not found in the subject"),
        }
        Ok(0)
    }
}
