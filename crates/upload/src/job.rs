//! Validated description of one upload run.

use s3check_transfer::{
    DEFAULT_PART_SIZE, MIN_PART_SIZE, Part, Partitioner, Payload, TransferError, checksum_bytes,
    checksum_concat,
};

use crate::dispatcher::DEFAULT_CONCURRENCY;
use crate::error::UploadError;
use crate::selector::PartSelection;
use crate::store::UploadTarget;

/// Caller-supplied job settings.
#[derive(Debug, Clone)]
pub struct UploadJobConfig {
    pub bucket: String,
    pub key: String,
    pub part_size: usize,
    /// Floor for `part_size`; lowered only for stores that accept tiny parts.
    pub min_part_size: usize,
    /// Part numbers to include in the final object (empty = all).
    pub part_indices: Vec<u32>,
    /// Upload an extra zero-length part as the last part number.
    pub upload_empty_part: bool,
    pub concurrency: usize,
    /// Emit raw remote responses as events.
    pub verbose: bool,
}

impl Default for UploadJobConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: String::new(),
            part_size: DEFAULT_PART_SIZE,
            min_part_size: MIN_PART_SIZE,
            part_indices: Vec::new(),
            upload_empty_part: false,
            concurrency: DEFAULT_CONCURRENCY,
            verbose: false,
        }
    }
}

/// One validated upload. Immutable once built.
#[derive(Debug, Clone)]
pub struct UploadJob {
    target: UploadTarget,
    payload: Payload,
    partitioner: Partitioner,
    selection: PartSelection,
    empty_part: Option<u32>,
    concurrency: usize,
    verbose: bool,
}

impl UploadJob {
    /// Validates `config` against `payload`.
    ///
    /// Every check here runs before any remote call is made.
    pub fn new(config: UploadJobConfig, payload: Payload) -> Result<Self, UploadError> {
        if config.bucket.trim().is_empty() {
            return Err(UploadError::Configuration("bucket is required".into()));
        }
        if config.key.trim().is_empty() {
            return Err(UploadError::Configuration("key is required".into()));
        }
        if config.concurrency == 0 {
            return Err(UploadError::Configuration(
                "concurrency must be at least 1".into(),
            ));
        }
        if config.part_indices.contains(&0) {
            return Err(UploadError::Configuration(
                "part indices must be greater than 0".into(),
            ));
        }
        let partitioner = Partitioner::with_min_part_size(config.part_size, config.min_part_size)
            .map_err(|e| UploadError::Configuration(e.to_string()))?;
        // An empty payload is only uploadable as the lone trailing empty part.
        match partitioner.parts(&payload) {
            Err(TransferError::EmptyPayload) if config.upload_empty_part => {}
            Err(e) => return Err(UploadError::Configuration(e.to_string())),
            Ok(_) => {}
        }

        let empty_part = config
            .upload_empty_part
            .then(|| partitioner.part_count(&payload) as u32 + 1);

        let total_parts = partitioner.part_count(&payload) + usize::from(empty_part.is_some());
        if !config.part_indices.is_empty()
            && config.part_indices.iter().all(|&n| n as usize > total_parts)
        {
            return Err(UploadError::Configuration(format!(
                "none of the selected parts exist (upload has {total_parts} parts)"
            )));
        }

        Ok(Self {
            target: UploadTarget {
                bucket: config.bucket,
                key: config.key,
            },
            payload,
            partitioner,
            selection: PartSelection::from_indices(config.part_indices),
            empty_part,
            concurrency: config.concurrency,
            verbose: config.verbose,
        })
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn selection(&self) -> &PartSelection {
        &self.selection
    }

    /// Part number of the synthetic empty trailing part, if requested.
    pub fn empty_part(&self) -> Option<u32> {
        self.empty_part
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn total_bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Total parts including the empty trailing part.
    pub fn part_count(&self) -> usize {
        self.partitioner.part_count(&self.payload) + usize::from(self.empty_part.is_some())
    }

    /// Parts to upload, ascending.
    pub fn work_items(&self) -> Vec<Part> {
        // Validated in `new`: the only error is an empty payload with a trailing part.
        let mut parts: Vec<Part> = self
            .partitioner
            .parts(&self.payload)
            .into_iter()
            .flatten()
            .collect();
        if let Some(n) = self.empty_part {
            parts.push(Part::empty(n));
        }
        parts
    }

    /// Recomputes the checksum of the bytes assigned to `part_number`.
    ///
    /// Reads the payload again instead of trusting cached part checksums.
    pub fn rederive_checksum(&self, part_number: u32) -> Option<String> {
        if self.empty_part == Some(part_number) {
            return Some(checksum_bytes(&[]));
        }
        let range = self
            .partitioner
            .range_of(part_number, self.payload.len())?;
        Some(checksum_bytes(&self.payload.as_bytes()[range]))
    }

    /// CRC32 of the object assembled from `part_numbers`, in the given order.
    pub fn assembled_checksum(&self, part_numbers: &[u32]) -> String {
        let bytes = self.payload.as_bytes();
        checksum_concat(
            part_numbers
                .iter()
                .filter_map(|&n| self.partitioner.range_of(n, bytes.len()))
                .map(|range| &bytes[range]),
        )
    }
}
