//! Core submission logic for Ekuatia.
//!
//! # Modules
//!
//! - [`xml`] - strict XML tree, serializer and exclusive canonicalization
//! - [`certificate`] - PKCS#12 identity loading and ephemeral key material
//! - [`signing`] - envelope normalization, enveloped signature and self-check
//! - [`batch`] - `rLoteDE` assembly and the stored single-entry archive
//! - [`preflight`] - local checks on the exact envelope about to be sent
//! - [`pipeline`] - orchestration from input document to recorded submission
//! - [`tracker`] - submission records and the polling state machine
//!
//! # Submission Workflow
//!
//! 1. **Sign**: normalize the `rDE` envelope and sign `DE`
//! 2. **Package**: wrap the signed documents in `rLoteDE`, zip and encode
//! 3. **Preflight**: re-parse the SOAP envelope and check every invariant
//! 4. **Submit**: send `rEnvioLote` and record the answer
//! 5. **Track**: poll the tracking number until a terminal status
//!
//! # Example
//!
//! ```rust,no_run
//! use ekuatia::adapters::sifen::SoapTransportClient;
//! use ekuatia::adapters::storage::create_submission_store;
//! use ekuatia::config::load_config;
//! use ekuatia::core::certificate::CertificateIdentity;
//! use ekuatia::core::pipeline::SubmissionPipeline;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ekuatia.toml")?;
//! let identity = Arc::new(CertificateIdentity::from_file(
//!     &config.certificate.path,
//!     &config.certificate.password,
//! )?);
//! let transport = Arc::new(SoapTransportClient::new(&config.sifen, config.environment, &identity)?);
//! let store = create_submission_store(&config.storage).await?;
//!
//! let pipeline = SubmissionPipeline::from_config(&config, identity, transport, store)?;
//! let outcome = pipeline.submit_document(&std::fs::read("factura.xml")?).await?;
//! println!("Submission: {}", outcome.submission_id());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod certificate;
pub mod pipeline;
pub mod preflight;
pub mod signing;
pub mod tracker;
pub mod xml;
