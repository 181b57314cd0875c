//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Ekuatia using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Ekuatia - SIFEN electronic document submission
#[derive(Parser, Debug)]
#[command(name = "ekuatia")]
#[command(version, about, long_about = None)]
#[command(author = "Ekuatia Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ekuatia.toml", env = "EKUATIA_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "EKUATIA_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign documents without sending them
    Sign(commands::sign::SignArgs),

    /// Sign, package and submit documents as one batch
    Send(commands::send::SendArgs),

    /// Query the status of submitted batches
    Poll(commands::poll::PollArgs),

    /// Settle a batch that requires per-document queries
    Resolve(commands::resolve::ResolveArgs),

    /// List recorded submissions
    Status(commands::status::StatusArgs),

    /// Show the loaded certificate
    CertInfo(commands::cert::CertInfoArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}
