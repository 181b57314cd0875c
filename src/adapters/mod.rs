//! External system integrations.
//!
//! - [`sifen`] - SOAP client for the tax authority web services
//! - [`storage`] - submission store abstraction (trait-based)
//! - [`postgresql`] - PostgreSQL store implementation
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits so the pipeline and
//! the tracker can be tested with in-process implementations.
//!
//! ```rust,no_run
//! use ekuatia::adapters::sifen::{SifenTransport, SoapTransportClient};
//! use ekuatia::adapters::storage::create_submission_store;
//! use ekuatia::config::load_config;
//! use ekuatia::core::certificate::CertificateIdentity;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ekuatia.toml")?;
//! let identity =
//!     CertificateIdentity::from_file(&config.certificate.path, &config.certificate.password)?;
//! let transport = SoapTransportClient::new(&config.sifen, config.environment, &identity)?;
//! let store = create_submission_store(&config.storage).await?;
//!
//! for submission in store.list().await? {
//!     println!("{} {}", submission.submission_id, submission.status());
//! }
//! # let _ = transport;
//! # Ok(())
//! # }
//! ```

pub mod postgresql;
pub mod sifen;
pub mod storage;
