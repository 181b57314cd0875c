//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{EkuatiaConfig, Environment, IdentityMode, StorageTarget};
use super::secret_string;
use crate::domain::errors::EkuatiaError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into EkuatiaConfig
/// 4. Applies environment variable overrides (EKUATIA_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use ekuatia::config::loader::load_config;
///
/// let config = load_config("ekuatia.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EkuatiaConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(EkuatiaError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        EkuatiaError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    load_config_from_str(&contents)
}

/// Loads configuration from TOML text
///
/// Same pipeline as [`load_config`] without the file read.
pub fn load_config_from_str(contents: &str) -> Result<EkuatiaConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: EkuatiaConfig = toml::from_str(&contents)
        .map_err(|e| EkuatiaError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        EkuatiaError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid"))
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied unchanged.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = env_var_pattern();
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        lines.push(processed.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(EkuatiaError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| EkuatiaError::Configuration(format!("Invalid value for {name}: {e}")))
}

/// Applies environment variable overrides using the EKUATIA_* prefix
///
/// Variables follow the pattern `EKUATIA_<SECTION>_<KEY>`, for example
/// `EKUATIA_SIFEN_TIMEOUT_SECONDS` or `EKUATIA_CERTIFICATE_PASSWORD`.
fn apply_env_overrides(config: &mut EkuatiaConfig) -> Result<()> {
    if let Ok(val) = std::env::var("EKUATIA_ENVIRONMENT") {
        config.environment = val
            .parse::<Environment>()
            .map_err(EkuatiaError::Configuration)?;
    }

    // Application overrides
    if let Ok(val) = std::env::var("EKUATIA_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("EKUATIA_APPLICATION_DRY_RUN") {
        config.application.dry_run = parse_override("EKUATIA_APPLICATION_DRY_RUN", &val)?;
    }

    // Certificate overrides
    if let Ok(val) = std::env::var("EKUATIA_CERTIFICATE_PATH") {
        config.certificate.path = val;
    }
    if let Ok(val) = std::env::var("EKUATIA_CERTIFICATE_PASSWORD") {
        config.certificate.password = secret_string(val);
    }

    // SIFEN overrides
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_TIMEOUT_SECONDS") {
        config.sifen.timeout_seconds = parse_override("EKUATIA_SIFEN_TIMEOUT_SECONDS", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_CONNECT_TIMEOUT_SECONDS") {
        config.sifen.connect_timeout_seconds =
            parse_override("EKUATIA_SIFEN_CONNECT_TIMEOUT_SECONDS", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_IDENTITY_MODE") {
        config.sifen.identity_mode = match val.as_str() {
            "pkcs12" => IdentityMode::Pkcs12,
            "pem_files" => IdentityMode::PemFiles,
            other => {
                return Err(EkuatiaError::Configuration(format!(
                    "Invalid EKUATIA_SIFEN_IDENTITY_MODE '{other}'. Must be one of: pkcs12, pem_files"
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_BYPASS_TAXPAYER_CHECK") {
        config.sifen.bypass_taxpayer_check =
            parse_override("EKUATIA_SIFEN_BYPASS_TAXPAYER_CHECK", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_REQUIRE_TEST_ENVIRONMENT") {
        config.sifen.require_test_environment =
            parse_override("EKUATIA_SIFEN_REQUIRE_TEST_ENVIRONMENT", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_ENDPOINTS_SUBMIT_BATCH") {
        config.sifen.endpoints.submit_batch = Some(val);
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_ENDPOINTS_QUERY_BATCH") {
        config.sifen.endpoints.query_batch = Some(val);
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_ENDPOINTS_QUERY_TAXPAYER") {
        config.sifen.endpoints.query_taxpayer = Some(val);
    }
    if let Ok(val) = std::env::var("EKUATIA_SIFEN_ENDPOINTS_QUERY_DOCUMENT") {
        config.sifen.endpoints.query_document = Some(val);
    }

    // Submission overrides
    if let Ok(val) = std::env::var("EKUATIA_SUBMISSION_MAX_DOCUMENTS_PER_BATCH") {
        config.submission.max_documents_per_batch =
            parse_override("EKUATIA_SUBMISSION_MAX_DOCUMENTS_PER_BATCH", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_SUBMISSION_ARTIFACTS_DIR") {
        config.submission.artifacts_dir = val;
    }

    // Tracker overrides
    if let Ok(val) = std::env::var("EKUATIA_TRACKER_POLL_INTERVAL_SECONDS") {
        config.tracker.poll_interval_seconds =
            parse_override("EKUATIA_TRACKER_POLL_INTERVAL_SECONDS", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_TRACKER_MAX_ERROR_ATTEMPTS") {
        config.tracker.max_error_attempts =
            parse_override("EKUATIA_TRACKER_MAX_ERROR_ATTEMPTS", &val)?;
    }

    // Storage overrides
    if let Ok(val) = std::env::var("EKUATIA_STORAGE_TARGET") {
        config.storage.target = match val.to_lowercase().as_str() {
            "memory" => StorageTarget::Memory,
            "file" => StorageTarget::File,
            "postgresql" => StorageTarget::PostgreSQL,
            other => {
                return Err(EkuatiaError::Configuration(format!(
                    "Invalid EKUATIA_STORAGE_TARGET '{other}'. Must be one of: memory, file, postgresql"
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("EKUATIA_STORAGE_PATH") {
        config.storage.path = val;
    }
    if let Some(ref mut pg) = config.storage.postgresql {
        if let Ok(val) = std::env::var("EKUATIA_STORAGE_POSTGRESQL_CONNECTION_STRING") {
            pg.connection_string = secret_string(val);
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("EKUATIA_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("EKUATIA_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("EKUATIA_LOGGING_AUDIT_ENABLED") {
        config.logging.audit_enabled = parse_override("EKUATIA_LOGGING_AUDIT_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("EKUATIA_LOGGING_AUDIT_PATH") {
        config.logging.audit_path = val;
    }

    Ok(())
}
