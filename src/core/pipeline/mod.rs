//! Submission orchestration
//!
//! - [`coordinator`] - the [`SubmissionPipeline`] from input document to a
//!   recorded batch submission

pub mod coordinator;

pub use coordinator::{PipelineOptions, SubmissionOutcome, SubmissionPipeline};
