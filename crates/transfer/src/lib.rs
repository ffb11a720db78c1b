//! Part checksums and fixed-size payload partitioning.
//!
//! The checksum wire format is the one S3 expects in `x-amz-checksum-crc32`:
//! CRC32 (IEEE) serialized big-endian and base64 encoded.

mod checksum;
mod partition;

pub use checksum::{
    checksum_bytes, checksum_concat, composite_checksum, decode_checksum, strip_part_count,
};
pub use partition::{Part, Partitioner, Parts, Payload};

/// Smallest part size accepted by default: 5 MiB.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default part size: 5 MiB.
pub const DEFAULT_PART_SIZE: usize = MIN_PART_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("part size must be at least {min} bytes, got {actual}")]
    PartSizeTooSmall { min: usize, actual: usize },

    #[error("invalid checksum encoding: {0}")]
    InvalidChecksum(String),

    #[error("no data provided: payload is empty")]
    EmptyPayload,
}
