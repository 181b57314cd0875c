//! Integration tests for logging functionality

use ekuatia::adapters::sifen::SubmitRequest;
use ekuatia::config::LoggingConfig;
use ekuatia::core::tracker::BatchStatus;
use ekuatia::domain::SubmissionId;
use ekuatia::logging::{init_logging, Exchange, TransportAuditLog};
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(!config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert!(!config.audit_enabled);
    assert!(!config.audit_path.is_empty());
}

// The global subscriber can only be installed once per process, so this is
// the only test in this binary that initializes it.
#[test]
fn test_file_logging_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");
    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "never".to_string(),
        ..LoggingConfig::default()
    };

    assert!(!log_path.exists());
    let guard = init_logging("debug", &config).unwrap();

    let id = SubmissionId::new("250101123456789").unwrap();
    ekuatia::log_submission!(&id, 2, "0300", "Lote recibido con éxito");
    ekuatia::log_transition!(&id, BatchStatus::Pending, BatchStatus::Processing, 1);
    drop(guard);

    assert!(log_path.is_dir());
    // Events from the library itself pass the default filter
    let written = std::fs::read_to_string(log_path.join("ekuatia.log")).unwrap();
    assert!(written.contains("Logging initialized"));
}

#[test]
fn test_invalid_level_is_rejected() {
    let err = init_logging("verbose", &LoggingConfig::default()).err().unwrap();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_audit_log_redacts_real_envelope() {
    let temp_dir = TempDir::new().unwrap();
    let audit = TransportAuditLog::new(temp_dir.path().join("audit/sifen.jsonl")).unwrap();

    let payload = "UEsDBBQAAAAAAPayloadThatMustNotLeak";
    let request = SubmitRequest::new(SubmissionId::new("250101123456789").unwrap(), payload);
    audit
        .record(&Exchange {
            operation: "submit_batch",
            endpoint: "https://sifen-test.set.gov.py/de/ws/async/recibe-lote.wsdl",
            request: request.envelope(),
            http_status: None,
            response: None,
            error: Some("connection refused"),
            duration_ms: 3,
        })
        .unwrap();

    let content = std::fs::read_to_string(audit.path()).unwrap();
    assert!(!content.contains(payload));
    assert!(content.contains(&format!("[REDACTED {} bytes]", payload.len())));

    let entry: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(entry["error"], "connection refused");
    assert!(entry["http_status"].is_null());
}
