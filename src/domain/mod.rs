//! Domain types shared by every layer.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`Cdc`], [`TaxId`], [`SubmissionId`], [`TrackingNumber`])
//! - **Error types** ([`EkuatiaError`], [`SifenError`], itemized [`ProfileViolation`] and
//!   [`PreflightViolation`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Identifiers are newtypes so a tracking number can never be passed where a
//! submission id is expected:
//!
//! ```rust
//! use ekuatia::domain::{Cdc, TrackingNumber};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cdc = Cdc::new("01800123456001001000000120250101123456789")?;
//! let tracking = TrackingNumber::new("123456")?;
//!
//! // let wrong: Cdc = tracking;  // Compile error
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, EkuatiaError>`]:
//!
//! ```rust,no_run
//! use ekuatia::domain::Result;
//!
//! fn example() -> Result<()> {
//!     let config = ekuatia::config::load_config("ekuatia.toml")?;
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod ids;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{
    EkuatiaError, PreflightReport, PreflightViolation, ProfileViolation, SifenError,
};
pub use ids::{Cdc, SubmissionId, TaxId, TrackingNumber, SUBMISSION_ID_LEN};
pub use result::Result;
