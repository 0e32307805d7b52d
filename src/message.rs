//! Units of transfer between adapters.
//!
//! A [`Blob`] carries a batch of events from an input adapter to an output
//! adapter; a [`BlobOutcome`] summarises what happened to it for the run report.

mod blob;
mod outcome;

// Re-export message types
pub use blob::{Blob, FailedEvent};
pub use outcome::BlobOutcome;
