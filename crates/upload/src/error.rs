//! Upload error types.

use s3check_credentials::CredentialError;

use crate::phase::{Phase, UploadStatus};
use crate::store::Operation;

/// A remote call failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct StoreError {
    pub operation: Operation,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Stored parts disagree with what was sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("parts count mismatch: uploaded {uploaded}, listed {listed}")]
    CountMismatch { uploaded: usize, listed: usize },

    #[error("part {0} missing CRC32 checksum")]
    MissingChecksum(u32),

    #[error("checksum mismatch for part {part}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        part: u32,
        expected: String,
        actual: String,
    },

    #[error("server listed part {0} which was never uploaded")]
    UnknownPart(u32),

    #[error("object checksum mismatch: calculated {expected}, server reported {actual}")]
    ObjectChecksumMismatch { expected: String, actual: String },
}

/// Misuse of the phase state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    #[error("phase '{0}' is still pending")]
    AlreadyPending(String),

    #[error("no phase has been started")]
    NotStarted,
}

/// Errors produced during an upload run.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("credential resolution failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("transport error: {0}")]
    Transport(#[from] StoreError),

    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("cancelled")]
    Cancelled,

    #[error("phase tracking error: {0}")]
    Phase(#[from] PhaseError),

    #[error("upload worker failed: {0}")]
    Worker(String),
}

/// A run that stopped at a failed phase.
///
/// Carries the full status so the caller can print the history even on
/// hard failure.
#[derive(Debug, thiserror::Error)]
#[error("{}", .phase.summary_line())]
pub struct PhaseFailure {
    pub phase: Phase,
    #[source]
    pub cause: UploadError,
    pub status: UploadStatus,
}
