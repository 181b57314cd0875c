//! CLI command implementations
//!
//! Every command returns the process exit code: 0 ok, 2 configuration,
//! 3 validation, 4 connection, 5 fatal.

pub mod cert;
pub mod poll;
pub mod resolve;
pub mod send;
pub mod sign;
pub mod status;
pub mod validate;

use crate::adapters::sifen::SoapTransportClient;
use crate::adapters::storage::{create_submission_store, SubmissionStore};
use crate::config::{load_config, EkuatiaConfig};
use crate::core::certificate::CertificateIdentity;
use crate::domain::{EkuatiaError, Result};
use crate::logging::TransportAuditLog;
use std::sync::Arc;

/// Loads the configuration, printing the failure
pub(crate) fn load_or_report(config_path: &str) -> std::result::Result<EkuatiaConfig, i32> {
    load_config(config_path).map_err(|e| {
        println!("❌ Failed to load configuration file");
        println!("   Error: {e}");
        e.exit_code()
    })
}

/// Prints an error and returns its exit code
pub(crate) fn report(context: &str, error: &EkuatiaError) -> i32 {
    crate::log_error_with_context!(error, context);
    println!("❌ {context}");
    println!("   Error: {error}");
    if let EkuatiaError::Preflight(report) = error {
        for violation in &report.violations {
            println!("   - {violation}");
        }
        if let Some(dir) = &report.artifacts_dir {
            println!("   Artifacts: {}", dir.display());
        }
    }
    error.exit_code()
}

pub(crate) fn open_identity(config: &EkuatiaConfig) -> Result<Arc<CertificateIdentity>> {
    CertificateIdentity::from_file(&config.certificate.path, &config.certificate.password)
        .map(Arc::new)
}

/// Builds the SOAP client, with the audit log when enabled
pub(crate) fn open_transport(
    config: &EkuatiaConfig,
    identity: &CertificateIdentity,
) -> Result<Arc<SoapTransportClient>> {
    let mut client = SoapTransportClient::new(&config.sifen, config.environment, identity)?;
    if config.logging.audit_enabled {
        client = client.with_audit_log(TransportAuditLog::new(&config.logging.audit_path)?);
    }
    Ok(Arc::new(client))
}

pub(crate) async fn open_store(config: &EkuatiaConfig) -> Result<Arc<dyn SubmissionStore>> {
    create_submission_store(&config.storage).await
}
