//! Configuration management.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Configuration files support:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `EKUATIA_*` environment overrides
//! - Default values for optional settings
//! - Validation, including the production-only restrictions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ekuatia::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ekuatia.toml")?;
//!
//! println!("Environment: {}", config.environment);
//! println!("Certificate: {}", config.certificate.path);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! environment = "test"
//!
//! [certificate]
//! path = "/etc/ekuatia/firma.p12"
//! password = "${EKUATIA_CERT_PASSWORD}"
//!
//! [sifen]
//! timeout_seconds = 60
//! bypass_taxpayer_check = false
//!
//! [submission]
//! max_documents_per_batch = 50
//! artifacts_dir = "/var/lib/ekuatia/artifacts"
//!
//! [tracker]
//! poll_interval_seconds = 60
//!
//! [storage]
//! target = "file"
//! path = "/var/lib/ekuatia/submissions.json"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, load_config_from_str};
pub use schema::{
    ApplicationConfig, CertificateConfig, EkuatiaConfig, EndpointOverrides, Environment,
    IdentityMode, LoggingConfig, PostgreSQLConfig, SifenConfig, StorageConfig, StorageTarget,
    SubmissionConfig, TrackerConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
