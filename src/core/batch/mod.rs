//! Batch packaging
//!
//! Signed documents travel to the authority as
//! `base64(zip(lote.xml = <rLoteDE>...</rLoteDE>))`. The packager builds and
//! checks the `rLoteDE` envelope; [`archive`] produces the stored single-entry
//! archive and its base64 encoding.

pub mod archive;
pub mod packager;

pub use archive::{compress, decode, encode, read_entries, ArchiveEntry};
pub use packager::{Batch, BatchPackager, MAX_DOCUMENTS_PER_BATCH};
