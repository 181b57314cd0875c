//! Document signing
//!
//! - [`normalize`] - Brings any accepted input into the unsigned envelope layout
//! - [`signer`] - Enveloped XML-DSig signing with passthrough of real signatures
//! - [`profile`] - Read-only verification of a signed envelope
//!
//! # Example
//!
//! ```rust,no_run
//! use ekuatia::config::secret_string;
//! use ekuatia::core::certificate::CertificateIdentity;
//! use ekuatia::core::signing::CanonicalSigner;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = CertificateIdentity::from_file("firma.p12", &secret_string("pw".to_string()))?;
//! let signer = CanonicalSigner::new(Arc::new(identity), "150");
//!
//! let signed = signer.sign(&std::fs::read("factura.xml")?)?;
//! println!("Signed {}", signed.cdc());
//! # Ok(())
//! # }
//! ```

pub mod normalize;
pub mod profile;
pub mod signer;

pub use normalize::{envelope_rank, normalize_envelope, NormalizedEnvelope};
pub use profile::{check_envelope, check_signed_document, ensure_conforms, has_real_signature};
pub use signer::{CanonicalSigner, SignedDocument};
