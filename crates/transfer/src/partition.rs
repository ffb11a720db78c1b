use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

use bytes::Bytes;

use crate::{MIN_PART_SIZE, TransferError, checksum_bytes};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The full upload payload. Immutable once built; parts borrow slices of it.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    data: Bytes,
}

impl Payload {
    pub fn from_text(text: &str) -> Self {
        Self {
            data: Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Reads the whole file into memory.
    pub fn from_file(path: &Path) -> Result<Self, TransferError> {
        Ok(Self {
            data: Bytes::from(std::fs::read(path)?),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Zero-copy view of `range`.
    pub fn slice(&self, range: Range<usize>) -> Bytes {
        self.data.slice(range)
    }

    /// Checksum of the whole payload.
    pub fn checksum(&self) -> String {
        checksum_bytes(&self.data)
    }
}

// ---------------------------------------------------------------------------
// Part
// ---------------------------------------------------------------------------

/// One contiguous slice of the payload, numbered from 1.
#[derive(Debug, Clone)]
pub struct Part {
    number: u32,
    range: Range<usize>,
    data: Bytes,
    checksum: OnceLock<String>,
}

impl Part {
    /// A zero-length part, used as a synthetic trailing part.
    pub fn empty(number: u32) -> Self {
        Self {
            number,
            range: 0..0,
            data: Bytes::new(),
            checksum: OnceLock::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Byte range within the owning payload.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Wire-format CRC32 of this part, computed on first use.
    pub fn checksum(&self) -> &str {
        self.checksum.get_or_init(|| checksum_bytes(&self.data))
    }
}

// ---------------------------------------------------------------------------
// Partitioner
// ---------------------------------------------------------------------------

/// Splits a payload into fixed-size parts.
#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    part_size: usize,
}

impl Partitioner {
    /// Creates a partitioner enforcing [`MIN_PART_SIZE`].
    pub fn new(part_size: usize) -> Result<Self, TransferError> {
        Self::with_min_part_size(part_size, MIN_PART_SIZE)
    }

    /// Creates a partitioner with a custom floor (must itself be non-zero).
    pub fn with_min_part_size(part_size: usize, min: usize) -> Result<Self, TransferError> {
        let min = min.max(1);
        if part_size < min {
            return Err(TransferError::PartSizeTooSmall {
                min,
                actual: part_size,
            });
        }
        Ok(Self { part_size })
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Number of parts `payload` splits into.
    pub fn part_count(&self, payload: &Payload) -> usize {
        payload.len().div_ceil(self.part_size)
    }

    /// Lazily yields the parts of `payload`. Calling again restarts from part 1.
    ///
    /// An empty payload has no parts and is rejected.
    pub fn parts(&self, payload: &Payload) -> Result<Parts, TransferError> {
        if payload.is_empty() {
            return Err(TransferError::EmptyPayload);
        }
        Ok(Parts {
            payload: payload.clone(),
            part_size: self.part_size,
            offset: 0,
            next_number: 1,
        })
    }

    /// Byte range assigned to `part_number` for a payload of `len` bytes.
    ///
    /// Returns `None` past the last part.
    pub fn range_of(&self, part_number: u32, len: usize) -> Option<Range<usize>> {
        if part_number == 0 {
            return None;
        }
        let start = (part_number as usize - 1).checked_mul(self.part_size)?;
        if start >= len {
            return None;
        }
        Some(start..std::cmp::min(start + self.part_size, len))
    }
}

/// Iterator over the parts of a payload.
#[derive(Debug, Clone)]
pub struct Parts {
    payload: Payload,
    part_size: usize,
    offset: usize,
    next_number: u32,
}

impl Iterator for Parts {
    type Item = Part;

    fn next(&mut self) -> Option<Part> {
        let remaining = self.payload.len() - self.offset;
        if remaining == 0 {
            return None;
        }

        let size = std::cmp::min(remaining, self.part_size);
        let range = self.offset..self.offset + size;
        let part = Part {
            number: self.next_number,
            data: self.payload.slice(range.clone()),
            range,
            checksum: OnceLock::new(),
        };
        self.offset += size;
        self.next_number += 1;
        Some(part)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.payload.len() - self.offset).div_ceil(self.part_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Parts {}
