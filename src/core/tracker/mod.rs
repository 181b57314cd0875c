//! Batch status tracking
//!
//! - [`record`] - persisted submission records and the transition table
//! - [`poller`] - the [`BatchStatusTracker`] that queries the authority

pub mod poller;
pub mod record;

pub use poller::{BatchStatusTracker, PollSummary};
pub use record::{BatchStatus, BatchSubmission, DocumentRecord, StatusUpdate};

pub(crate) use record::StoredSubmission;
