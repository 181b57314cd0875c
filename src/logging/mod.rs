//! Logging and observability
//!
//! This module provides:
//! - JSON-formatted structured logs with configurable levels
//! - Local file logging with rotation
//! - A redacted JSON-lines audit log of SOAP exchanges
//!
//! # Example
//!
//! ```no_run
//! use ekuatia::logging::init_logging;
//! use ekuatia::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod audit;
pub mod structured;

pub use audit::{Exchange, TransportAuditLog};
pub use structured::{init_logging, LoggingGuard};

/// Log the outcome of a batch submission
///
/// # Example
///
/// ```no_run
/// use ekuatia::log_submission;
/// use ekuatia::domain::SubmissionId;
///
/// let id = SubmissionId::new("250101123456789").unwrap();
/// log_submission!(&id, 3, "0300", "Lote recibido con éxito");
/// ```
#[macro_export]
macro_rules! log_submission {
    ($submission_id:expr, $documents:expr, $code:expr, $message:expr) => {
        tracing::info!(
            submission_id = %$submission_id,
            documents = $documents,
            code = %$code,
            message = %$message,
            "Batch submitted"
        );
    };
}

/// Log a batch status transition
///
/// # Example
///
/// ```no_run
/// use ekuatia::log_transition;
/// use ekuatia::core::tracker::BatchStatus;
/// use ekuatia::domain::SubmissionId;
///
/// let id = SubmissionId::new("250101123456789").unwrap();
/// log_transition!(&id, BatchStatus::Pending, BatchStatus::Done, 1);
/// ```
#[macro_export]
macro_rules! log_transition {
    ($submission_id:expr, $from:expr, $to:expr, $attempts:expr) => {
        tracing::info!(
            submission_id = %$submission_id,
            from = %$from,
            to = %$to,
            attempts = $attempts,
            "Batch status changed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use ekuatia::log_error_with_context;
/// use ekuatia::domain::EkuatiaError;
///
/// let error = EkuatiaError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
