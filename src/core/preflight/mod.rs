//! Preflight validation and postmortem artifacts
//!
//! [`PreflightValidator`] re-reads the submit envelope exactly as it will be
//! sent. When a submission is aborted, [`ArtifactStore`] keeps every
//! intermediate product next to the itemized violations.

pub mod artifacts;
pub mod validator;

pub use artifacts::{ArtifactBundle, ArtifactStore};
pub use validator::PreflightValidator;
