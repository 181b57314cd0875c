// Ekuatia - SIFEN electronic document submission
// Copyright (c) 2025 Ekuatia Contributors
// Licensed under the MIT License

//! # Ekuatia - SIFEN electronic document submission
//!
//! Ekuatia signs electronic tax documents, packages them into batches and
//! submits them to the SIFEN web services of the Paraguayan tax authority,
//! then tracks each batch until the authority reports a final outcome.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Signing** `DE` documents with an enveloped XML signature under one
//!   fixed algorithm profile
//! - **Packaging** signed documents into `rLoteDE`, zipped and base64 encoded
//! - **Preflight** checks on the exact SOAP envelope before it is sent
//! - **Submitting** batches over mutually authenticated TLS
//! - **Tracking** batches through a polling state machine
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Signing, packaging, preflight, pipeline and tracker
//! - [`adapters`] - SIFEN SOAP client and submission stores
//! - [`domain`] - Identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and the transport audit log
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ekuatia::config::load_config;
//! use ekuatia::core::certificate::CertificateIdentity;
//! use ekuatia::core::signing::CanonicalSigner;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ekuatia.toml")?;
//! let identity = Arc::new(CertificateIdentity::from_file(
//!     &config.certificate.path,
//!     &config.certificate.password,
//! )?);
//!
//! let signer = CanonicalSigner::new(identity, config.sifen.version.clone());
//! let signed = signer.sign(&std::fs::read("factura.xml")?)?;
//! println!("Signed {}", signed.cdc());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::EkuatiaError`]. Signing and
//! packaging never correct their input: a violated invariant aborts with an
//! error naming it.
//!
//! ```rust,no_run
//! use ekuatia::domain::EkuatiaError;
//!
//! fn example() -> Result<(), EkuatiaError> {
//!     let config = ekuatia::config::load_config("ekuatia.toml")?;
//!     println!("{}", config.environment);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
