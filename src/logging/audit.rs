//! Transport audit log
//!
//! Appends every SOAP request/response pair as one JSON line. The base64
//! payload inside `xDE` is redacted; the envelope structure is kept verbatim.

use crate::adapters::sifen::envelopes::redact_payload;
use crate::domain::{EkuatiaError, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Audit log entry
#[derive(Debug, Serialize)]
struct ExchangeEntry<'a> {
    timestamp: String,
    operation: &'a str,
    endpoint: &'a str,
    http_status: Option<u16>,
    duration_ms: u64,
    request: String,
    response: Option<String>,
    error: Option<&'a str>,
}

/// One finished request/response exchange
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    pub operation: &'a str,
    pub endpoint: &'a str,
    pub request: &'a str,
    pub http_status: Option<u16>,
    pub response: Option<&'a str>,
    pub error: Option<&'a str>,
    pub duration_ms: u64,
}

/// Append-only JSON-lines audit file
#[derive(Debug)]
pub struct TransportAuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TransportAuditLog {
    /// Opens (and creates the directory of) an audit file
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                EkuatiaError::Io(format!(
                    "Failed to create audit log directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records one exchange
    pub fn record(&self, exchange: &Exchange<'_>) -> Result<()> {
        let entry = ExchangeEntry {
            timestamp: Utc::now().to_rfc3339(),
            operation: exchange.operation,
            endpoint: exchange.endpoint,
            http_status: exchange.http_status,
            duration_ms: exchange.duration_ms,
            request: redact_payload(exchange.request),
            response: exchange.response.map(redact_payload),
            error: exchange.error,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| EkuatiaError::Io("audit log lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                EkuatiaError::Io(format!(
                    "Failed to open audit log {}: {e}",
                    self.path.display()
                ))
            })?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_exchange_is_recorded_redacted() {
        let dir = tempdir().unwrap();
        let log = TransportAuditLog::new(dir.path().join("audit/sifen.jsonl")).unwrap();

        let request = "<rEnvioLote><dId>250101123456789</dId><xDE>U0VDUkVU</xDE></rEnvioLote>";
        log.record(&Exchange {
            operation: "submit_batch",
            endpoint: "https://sifen-test.set.gov.py/de/ws/async/recibe-lote.wsdl",
            request,
            http_status: Some(200),
            response: Some("<rResEnviLoteDe><dCodRes>0300</dCodRes></rResEnviLoteDe>"),
            error: None,
            duration_ms: 12,
        })
        .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        let entry: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(entry["operation"], "submit_batch");
        assert_eq!(entry["http_status"], 200);
        let logged = entry["request"].as_str().unwrap();
        assert!(logged.contains("<dId>250101123456789</dId>"));
        assert!(logged.contains("[REDACTED 8 bytes]"));
        assert!(!content.contains("U0VDUkVU"));
    }

    #[test]
    fn test_entries_are_appended() {
        let dir = tempdir().unwrap();
        let log = TransportAuditLog::new(dir.path().join("sifen.jsonl")).unwrap();
        for _ in 0..3 {
            log.record(&Exchange {
                operation: "query_batch_status",
                endpoint: "http://localhost",
                request: "<r/>",
                http_status: None,
                response: None,
                error: Some("connection refused"),
                duration_ms: 1,
            })
            .unwrap();
        }
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
    }
}
