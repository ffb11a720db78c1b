//! Checksum-verified multipart upload engine.
//!
//! This crate implements the **upload lifecycle** against an abstract
//! [`ObjectStore`]. It has no SDK or terminal dependencies: the binary
//! provides an `ObjectStore` backed by the S3 SDK and renders the events and
//! phase summary this crate produces.
//!
//! # Pipeline
//!
//! 1. **Initialize**: create the multipart upload with CRC32 checksums
//! 2. **Upload**: fan parts out to a bounded worker pool where the first error wins
//! 3. **Verify**: list stored parts and compare checksums against the payload
//! 4. **Select**: choose which uploaded parts the final object references
//! 5. **Complete**: assemble the object from the selected parts
//!
//! Any failure after step 1 aborts the remote upload before returning.

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod phase;
pub mod selector;
pub mod store;
pub mod types;
pub mod verify;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience.
pub use dispatcher::{DEFAULT_CONCURRENCY, DispatchFailure, DispatchOutcome, UploadDispatcher};
pub use error::{PhaseError, PhaseFailure, StoreError, UploadError, VerificationError};
pub use job::{UploadJob, UploadJobConfig};
pub use orchestrator::UploadOrchestrator;
pub use phase::{Phase, PhaseKind, SharedStatus, UploadStatus};
pub use selector::{PartSelection, Selection};
pub use store::{
    ChecksumAlgorithm, CompletePartRef, CompleteUploadOutput, CompleteUploadRequest, ListedPart,
    ObjectStore, Operation, StoreFuture, UploadPartOutput, UploadPartRequest, UploadTarget,
};
pub use types::{CompletedPart, PartInfo, PartReport, UploadEvent, UploadOutcome};
pub use verify::{VerificationEngine, VerificationReport};
