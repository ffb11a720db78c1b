//! Object store capability consumed by the upload engine.
//!
//! `ObjectStore` is implemented by the binary on top of the S3 SDK.
//! Keeping it a trait decouples the lifecycle from the transport and lets
//! tests drive the engine with an in-memory store.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;

/// Boxed future returned by [`ObjectStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Remote operations, used to tag errors and verbose dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    CreateUpload,
    UploadPart,
    ListParts,
    CompleteUpload,
    AbortUpload,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateUpload => "CreateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::ListParts => "ListParts",
            Self::CompleteUpload => "CompleteMultipartUpload",
            Self::AbortUpload => "AbortMultipartUpload",
        };
        f.write_str(name)
    }
}

/// Checksum algorithm requested when the upload is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ChecksumAlgorithm {
    #[default]
    Crc32,
}

/// Bucket and key of the object being uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One `UploadPart` call.
#[derive(Debug, Clone)]
pub struct UploadPartRequest {
    pub part_number: u32,
    pub body: Bytes,
    /// Wire-format CRC32 of `body`.
    pub checksum_crc32: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadPartOutput {
    pub etag: String,
    /// Checksum echoed by the server, if it returned one.
    pub checksum_crc32: Option<String>,
}

/// A part as the server has it on record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedPart {
    pub part_number: u32,
    pub size: u64,
    pub etag: String,
    pub checksum_crc32: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A part reference handed to `CompleteMultipartUpload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletePartRef {
    pub part_number: u32,
    pub etag: String,
    pub checksum_crc32: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteUploadRequest {
    /// Ascending by part number.
    pub parts: Vec<CompletePartRef>,
    /// Whole-object checksum sent with the completion call.
    pub checksum_crc32: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompleteUploadOutput {
    pub location: Option<String>,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub checksum_crc32: Option<String>,
}

/// Abstract multipart-upload capable object store.
///
/// Implementations must be safe for concurrent use by all upload workers.
pub trait ObjectStore: Send + Sync {
    /// Starts a multipart upload and returns its upload ID.
    fn create_upload<'a>(
        &'a self,
        target: &'a UploadTarget,
        algorithm: ChecksumAlgorithm,
    ) -> StoreFuture<'a, String>;

    /// Uploads one part tagged with its checksum.
    fn upload_part<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
        request: UploadPartRequest,
    ) -> StoreFuture<'a, UploadPartOutput>;

    /// Lists every part stored for the upload.
    fn list_parts<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
    ) -> StoreFuture<'a, Vec<ListedPart>>;

    /// Assembles the object from the given parts.
    fn complete_upload<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
        request: CompleteUploadRequest,
    ) -> StoreFuture<'a, CompleteUploadOutput>;

    /// Discards the upload and every stored part.
    fn abort_upload<'a>(&'a self, target: &'a UploadTarget, upload_id: &'a str)
    -> StoreFuture<'a, ()>;
}
