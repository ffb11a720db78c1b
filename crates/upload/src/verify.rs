//! Post-upload verification against the server's part listing.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{UploadError, VerificationError};
use crate::job::UploadJob;
use crate::store::{ListedPart, ObjectStore};
use crate::types::{CompletedPart, UploadEvent};

/// Parts the server confirmed, ascending.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub listed: Vec<ListedPart>,
}

/// Checks stored parts against checksums re-derived from the payload.
pub struct VerificationEngine<'a> {
    store: &'a dyn ObjectStore,
    cancel: CancellationToken,
}

impl<'a> VerificationEngine<'a> {
    pub fn new(store: &'a dyn ObjectStore, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Lists the parts of `upload_id` once and compares them with `completed`.
    ///
    /// Every uploaded part is checked, whatever ends up in the final object.
    /// Expected checksums come from the payload bytes, not from upload
    /// responses.
    pub async fn verify(
        &self,
        job: &UploadJob,
        upload_id: &str,
        completed: &[CompletedPart],
        events_tx: &mpsc::UnboundedSender<UploadEvent>,
    ) -> Result<VerificationReport, UploadError> {
        let mut listed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
            res = self.store.list_parts(job.target(), upload_id) => res?,
        };
        listed.sort_by_key(|p| p.part_number);
        debug!(listed = listed.len(), uploaded = completed.len(), "parts listed");
        let _ = events_tx.send(UploadEvent::PartsListed {
            parts: listed.clone(),
        });

        check_listing(job, completed, &listed)?;

        let _ = events_tx.send(UploadEvent::Verified {
            parts: listed.len(),
        });
        Ok(VerificationReport { listed })
    }
}

fn check_listing(
    job: &UploadJob,
    completed: &[CompletedPart],
    listed: &[ListedPart],
) -> Result<(), VerificationError> {
    if listed.len() != completed.len() {
        return Err(VerificationError::CountMismatch {
            uploaded: completed.len(),
            listed: listed.len(),
        });
    }

    let uploaded: BTreeMap<u32, &CompletedPart> =
        completed.iter().map(|p| (p.part_number, p)).collect();

    for part in listed {
        let number = part.part_number;
        if !uploaded.contains_key(&number) {
            return Err(VerificationError::UnknownPart(number));
        }
        let expected = job
            .rederive_checksum(number)
            .ok_or(VerificationError::UnknownPart(number))?;
        let actual = part
            .checksum_crc32
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(VerificationError::MissingChecksum(number))?;
        if actual != expected {
            return Err(VerificationError::ChecksumMismatch {
                part: number,
                expected,
                actual: actual.to_string(),
            });
        }
    }
    Ok(())
}
