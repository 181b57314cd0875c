//! Structured logging setup using tracing
//!
//! Human-readable events go to stderr so command output on stdout stays
//! clean for scripts. When `logging.local_enabled` is set, the same events are
//! also written as JSON lines to `<local_path>/ekuatia.log`.
//!
//! # Example
//!
//! ```no_run
//! use ekuatia::logging::init_logging;
//! use ekuatia::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//! ```

use crate::config::LoggingConfig;
use crate::domain::{EkuatiaError, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// File name of the JSON log inside `logging.local_path`
pub const LOG_FILE_NAME: &str = "ekuatia.log";

/// HTTP stack crates are capped at `warn`; request and response bodies are
/// already logged by the transport client at `debug`.
const QUIET_DEPENDENCIES: &[&str] = &["reqwest", "hyper", "native_tls", "tokio_postgres"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background file writer alive; drop it last to flush
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber
///
/// `RUST_LOG`, when set, replaces the filter built from `level`.
///
/// # Errors
///
/// `EkuatiaError::Configuration` for an unknown level or a log directory that
/// cannot be created.
pub fn init_logging(level: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = parse_log_level(level)?;

    let mut layers: Vec<BoxedLayer> = vec![tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(build_filter(level))
        .boxed()];

    let file_guard = if config.local_enabled {
        let (layer, guard) = json_file_layer(Path::new(&config.local_path), &config.local_rotation, level)?;
        layers.push(layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry().with(layers).init();

    tracing::debug!(
        level = %level,
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        audit_enabled = config.audit_enabled,
        audit_path = %config.audit_path,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn json_file_layer(
    directory: &Path,
    rotation: &str,
    level: Level,
) -> Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(directory).map_err(|e| {
        EkuatiaError::Configuration(format!(
            "Failed to create log directory {}: {e}",
            directory.display()
        ))
    })?;

    let appender = RollingFileAppender::new(parse_rotation(rotation), directory, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_thread_ids(true)
        .with_writer(writer)
        .with_filter(build_filter(level))
        .boxed();
    Ok((layer, guard))
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(level)))
}

fn filter_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    let mut directives = vec![format!("ekuatia={level}")];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|name| format!("{name}=warn")));
    directives.join(",")
}

fn parse_rotation(rotation: &str) -> Rotation {
    match rotation {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(EkuatiaError::Configuration(format!(
            "Invalid log level: {level}. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}
