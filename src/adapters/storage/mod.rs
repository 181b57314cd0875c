//! Submission persistence
//!
//! - [`traits`] - the [`SubmissionStore`] contract
//! - [`memory`] - process-local store
//! - [`file`] - JSON file store
//! - [`factory`] - store selection from configuration
//!
//! The PostgreSQL backend lives in [`crate::adapters::postgresql`].

pub mod factory;
pub mod file;
pub mod memory;
pub mod traits;

pub use factory::create_submission_store;
pub use file::FileSubmissionStore;
pub use memory::MemorySubmissionStore;
pub use traits::SubmissionStore;
