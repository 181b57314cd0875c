//! Certificate management
//!
//! Loads the PKCS#12 signing identity and exposes the key material the
//! signer and the mutual-TLS transport need.
//!
//! # Example
//!
//! ```rust,no_run
//! use ekuatia::config::secret_string;
//! use ekuatia::core::certificate::CertificateIdentity;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let password = secret_string("p12-password".to_string());
//! let identity = CertificateIdentity::from_file("firma.p12", &password)?;
//!
//! if let Some(ruc) = identity.tax_id() {
//!     println!("Certificate holder: {ruc}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod ephemeral;
pub mod identity;

pub use ephemeral::EphemeralKeyFiles;
pub use identity::CertificateIdentity;
