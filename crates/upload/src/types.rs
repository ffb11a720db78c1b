//! Data types for the upload flow.

use s3check_transfer::strip_part_count;
use serde::Serialize;

use crate::phase::UploadStatus;
use crate::store::{CompletePartRef, ListedPart, Operation};

/// A part the server accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
    /// Locally computed checksum sent with the part.
    pub checksum_crc32: String,
}

impl From<&CompletedPart> for CompletePartRef {
    fn from(part: &CompletedPart) -> Self {
        Self {
            part_number: part.part_number,
            etag: part.etag.clone(),
            checksum_crc32: part.checksum_crc32.clone(),
        }
    }
}

/// Size and checksum of an uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartInfo {
    pub part_number: u32,
    pub size: u64,
    pub checksum_crc32: String,
}

/// Per-part line of the final checksum table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartReport {
    pub part_number: u32,
    pub size: u64,
    pub checksum_crc32: String,
    /// Whether the final object references this part.
    pub included: bool,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub upload_id: String,
    pub location: Option<String>,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    /// Whole-object checksum reported by the server.
    pub server_checksum: Option<String>,
    /// Local CRC32 of the whole payload, sent with the completion call.
    pub object_checksum: String,
    /// Local CRC32 of the object the included parts assemble.
    pub assembled_checksum: String,
    /// Composite checksum of the included parts (`<crc>-<count>`).
    pub composite_checksum: Option<String>,
    /// Every uploaded part, ascending.
    pub parts: Vec<PartReport>,
    pub status: UploadStatus,
}

impl UploadOutcome {
    pub fn included_parts(&self) -> impl Iterator<Item = &PartReport> {
        self.parts.iter().filter(|p| p.included)
    }

    /// Compares the server's object checksum with the matching local value.
    ///
    /// Composite (`-N`) values are checked against the composite of the
    /// included parts, plain values against the assembled object checksum.
    /// `None` when the server reported nothing.
    pub fn server_checksum_matches(&self) -> Option<bool> {
        let server = self.server_checksum.as_deref()?;
        Some(strip_part_count(server) == strip_part_count(self.expected_server_checksum()?))
    }

    /// Local value the server's object checksum is compared against.
    pub fn expected_server_checksum(&self) -> Option<&str> {
        match self.server_checksum.as_deref() {
            Some(server) if server.contains('-') => self.composite_checksum.as_deref(),
            _ => Some(&self.assembled_checksum),
        }
    }
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A lifecycle stage began.
    Stage { message: String },
    /// Request and raw response of a remote call (verbose runs only).
    RemoteCall {
        operation: Operation,
        request: serde_json::Value,
        response: serde_json::Value,
    },
    /// A part was handed to the worker pool.
    PartQueued { part_number: u32 },
    /// A part upload succeeded.
    PartUploaded {
        part_number: u32,
        size: u64,
        bytes_uploaded: u64,
        total_bytes: u64,
    },
    /// Parts the server has on record, as listed for verification.
    PartsListed { parts: Vec<ListedPart> },
    /// Verification finished without mismatches.
    Verified { parts: usize },
    /// Part selection decision for the completion call.
    PartSelected { part_number: u32, included: bool },
    /// The remote upload was aborted after a failure.
    Aborted { upload_id: String },
    /// The best-effort abort itself failed.
    AbortFailed { upload_id: String, error: String },
    /// The object was assembled.
    Completed { target: String },
}
