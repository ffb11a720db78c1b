//! Upload orchestrator: drives one job through the full lifecycle.
//!
//! Reports progress as [`UploadEvent`]s and records every stage in the
//! phase tracker. Any failure after the upload was created aborts it on the
//! server before the failure is returned.

use std::future::Future;
use std::sync::Arc;

use s3check_transfer::composite_checksum;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatcher::{DispatchFailure, UploadDispatcher};
use crate::error::{PhaseFailure, UploadError, VerificationError};
use crate::job::UploadJob;
use crate::phase::{Phase, PhaseKind, SharedStatus};
use crate::store::{
    ChecksumAlgorithm, CompletePartRef, CompleteUploadRequest, ObjectStore, Operation,
    StoreFuture, UploadTarget,
};
use crate::types::{PartReport, UploadEvent, UploadOutcome};
use crate::verify::VerificationEngine;

/// Success and failure messages for a tracked phase.
struct PhaseMessages {
    ok: &'static str,
    failed: &'static str,
}

const INITIALIZATION: PhaseMessages = PhaseMessages {
    ok: "Upload initiated successfully",
    failed: "Failed to initiate upload",
};

const VERIFICATION: PhaseMessages = PhaseMessages {
    ok: "All parts verified successfully",
    failed: "Failed to verify parts",
};

const COMPLETION: PhaseMessages = PhaseMessages {
    ok: "Upload completed successfully",
    failed: "Failed to complete upload",
};

const OBJECT_CHECK: PhaseMessages = PhaseMessages {
    ok: "Object checksum verified successfully",
    failed: "Object checksum mismatch",
};

const PART_UPLOAD_FAILED: &str = "Failed to upload part";

/// Runs multipart uploads against an [`ObjectStore`].
pub struct UploadOrchestrator {
    store: Arc<dyn ObjectStore>,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` instead of a private token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns the cancellation token for this orchestrator.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads `job` and returns the outcome, or the phase that failed.
    pub async fn run(&self, job: &UploadJob) -> Result<UploadOutcome, PhaseFailure> {
        let status = SharedStatus::new();
        let target = job.target();
        info!(
            target = %target,
            parts = job.part_count(),
            bytes = job.total_bytes(),
            "starting multipart upload"
        );

        self.stage(format!("Initiating multipart upload to {target}"));
        let upload_id = self
            .tracked(
                &status,
                PhaseKind::Initialization,
                INITIALIZATION,
                self.remote(self.store.create_upload(target, ChecksumAlgorithm::Crc32)),
            )
            .await
            .inspect_err(|f| error!(target = %target, error = %f.cause, "initiate failed"))?;
        info!(upload_id = %upload_id, "multipart upload created");
        if job.verbose() {
            self.dump(
                Operation::CreateUpload,
                serde_json::json!({
                    "Bucket": target.bucket,
                    "Key": target.key,
                    "ChecksumAlgorithm": ChecksumAlgorithm::Crc32,
                }),
                serde_json::json!({ "UploadId": upload_id }),
            );
        }

        match self.transfer(job, &upload_id, &status).await {
            Ok(mut outcome) => {
                // The upload no longer exists once completed; nothing to abort.
                self.check_object(&mut outcome, &status)?;
                info!(target = %target, upload_id = %upload_id, "upload completed");
                let _ = self.events_tx.send(UploadEvent::Completed {
                    target: target.to_string(),
                });
                Ok(outcome)
            }
            Err(failure) => {
                error!(
                    upload_id = %upload_id,
                    phase = %failure.phase.kind,
                    error = %failure.cause,
                    "upload failed"
                );
                self.abort(target, &upload_id).await;
                Err(failure)
            }
        }
    }

    /// Everything after initialization: upload, verify, select, complete.
    async fn transfer(
        &self,
        job: &UploadJob,
        upload_id: &str,
        status: &SharedStatus,
    ) -> Result<UploadOutcome, PhaseFailure> {
        let target = job.target();

        self.stage(format!(
            "Uploading {} parts with {} workers",
            job.part_count(),
            job.concurrency()
        ));
        let dispatcher = UploadDispatcher::new(
            Arc::clone(&self.store),
            target.clone(),
            upload_id,
            self.cancel.clone(),
            status.clone(),
            self.events_tx.clone(),
        )
        .with_concurrency(job.concurrency())
        .with_verbose(job.verbose());

        let dispatched = match dispatcher.dispatch(job.work_items(), job.total_bytes()).await {
            Ok(dispatched) => dispatched,
            Err(DispatchFailure {
                part_number, error, ..
            }) => {
                return Err(record_failure(
                    status,
                    PhaseKind::PartUpload,
                    part_number,
                    PART_UPLOAD_FAILED,
                    error,
                ));
            }
        };

        self.stage("Verifying uploaded parts");
        let engine = VerificationEngine::new(self.store.as_ref(), self.cancel.clone());
        let report = self
            .tracked(
                status,
                PhaseKind::Verification,
                VERIFICATION,
                engine.verify(job, upload_id, &dispatched.completed, &self.events_tx),
            )
            .await?;
        if job.verbose() {
            self.dump(
                Operation::ListParts,
                serde_json::json!({
                    "Bucket": target.bucket,
                    "Key": target.key,
                    "UploadId": upload_id,
                }),
                serde_json::to_value(&report.listed).unwrap_or_default(),
            );
        }

        let selection = job.selection().select(&dispatched.completed);
        for part in &dispatched.completed {
            let _ = self.events_tx.send(UploadEvent::PartSelected {
                part_number: part.part_number,
                included: !selection.skipped.contains(&part.part_number),
            });
        }
        let included: Vec<u32> = selection.included.iter().map(|p| p.part_number).collect();
        let object_checksum = job.payload().checksum();
        let assembled_checksum = job.assembled_checksum(&included);

        self.stage(format!("Completing multipart upload with {} parts", included.len()));
        let request = CompleteUploadRequest {
            parts: selection.included.iter().map(CompletePartRef::from).collect(),
            checksum_crc32: Some(object_checksum.clone()),
        };
        let request_dump = job
            .verbose()
            .then(|| serde_json::to_value(&request).unwrap_or_default());
        let completed = self
            .tracked(
                status,
                PhaseKind::Completion,
                COMPLETION,
                self.remote(self.store.complete_upload(target, upload_id, request)),
            )
            .await?;
        if let Some(request) = request_dump {
            self.dump(
                Operation::CompleteUpload,
                request,
                serde_json::to_value(&completed).unwrap_or_default(),
            );
        }

        let included_checksums: Vec<String> = selection
            .included
            .iter()
            .map(|p| p.checksum_crc32.clone())
            .collect();
        let parts = dispatched
            .infos
            .into_iter()
            .map(|info| PartReport {
                included: !selection.skipped.contains(&info.part_number),
                part_number: info.part_number,
                size: info.size,
                checksum_crc32: info.checksum_crc32,
            })
            .collect();

        Ok(UploadOutcome {
            upload_id: upload_id.to_string(),
            location: completed.location,
            etag: completed.etag,
            version_id: completed.version_id,
            server_checksum: completed.checksum_crc32,
            object_checksum,
            assembled_checksum,
            composite_checksum: composite_checksum(&included_checksums).ok(),
            parts,
            status: status.snapshot(),
        })
    }

    /// Runs `work` as one phase of `kind`, closing the phase with its outcome.
    async fn tracked<T>(
        &self,
        status: &SharedStatus,
        kind: PhaseKind,
        messages: PhaseMessages,
        work: impl Future<Output = Result<T, UploadError>>,
    ) -> Result<T, PhaseFailure> {
        if let Err(e) = status.start_phase(kind, None) {
            return Err(detached_failure(status, kind, None, messages.failed, e.into()));
        }
        match work.await {
            Ok(value) => match status.end_phase(true, messages.ok, None) {
                Ok(_) => Ok(value),
                Err(e) => Err(detached_failure(status, kind, None, messages.failed, e.into())),
            },
            Err(cause) => match status.end_phase(false, messages.failed, Some(cause.to_string())) {
                Ok(phase) => Err(PhaseFailure {
                    phase,
                    cause,
                    status: status.snapshot(),
                }),
                Err(_) => Err(detached_failure(status, kind, None, messages.failed, cause)),
            },
        }
    }

    /// Compares the server's object checksum with the local one and records
    /// the result. Skipped when the server reported no checksum.
    fn check_object(
        &self,
        outcome: &mut UploadOutcome,
        status: &SharedStatus,
    ) -> Result<(), PhaseFailure> {
        let (Some(actual), Some(expected)) = (
            outcome.server_checksum.clone(),
            outcome.expected_server_checksum().map(str::to_string),
        ) else {
            return Ok(());
        };

        if outcome.server_checksum_matches() == Some(false) {
            error!(expected = %expected, actual = %actual, "object checksum mismatch");
            let cause = VerificationError::ObjectChecksumMismatch { expected, actual };
            return Err(record_failure(
                status,
                PhaseKind::Verification,
                None,
                OBJECT_CHECK.failed,
                cause.into(),
            ));
        }
        if let Err(e) = status.record(PhaseKind::Verification, None, true, OBJECT_CHECK.ok, None) {
            return Err(detached_failure(
                status,
                PhaseKind::Verification,
                None,
                OBJECT_CHECK.failed,
                e.into(),
            ));
        }
        outcome.status = status.snapshot();
        Ok(())
    }

    /// Races a store call against the caller's cancellation.
    async fn remote<T>(&self, call: StoreFuture<'_, T>) -> Result<T, UploadError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            res = call => res.map_err(UploadError::from),
        }
    }

    /// Best-effort abort. Runs even after cancellation; never fails the caller.
    async fn abort(&self, target: &UploadTarget, upload_id: &str) {
        info!(upload_id = %upload_id, "aborting multipart upload");
        match self.store.abort_upload(target, upload_id).await {
            Ok(()) => {
                let _ = self.events_tx.send(UploadEvent::Aborted {
                    upload_id: upload_id.to_string(),
                });
            }
            Err(e) => {
                warn!(upload_id = %upload_id, error = %e, "failed to abort multipart upload");
                let _ = self.events_tx.send(UploadEvent::AbortFailed {
                    upload_id: upload_id.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn stage(&self, message: impl Into<String>) {
        let _ = self.events_tx.send(UploadEvent::Stage {
            message: message.into(),
        });
    }

    fn dump(
        &self,
        operation: Operation,
        request: serde_json::Value,
        response: serde_json::Value,
    ) {
        let _ = self.events_tx.send(UploadEvent::RemoteCall {
            operation,
            request,
            response,
        });
    }
}

/// Appends a failed phase and wraps it with its cause.
fn record_failure(
    status: &SharedStatus,
    kind: PhaseKind,
    part_number: Option<u32>,
    message: &str,
    cause: UploadError,
) -> PhaseFailure {
    match status.record(kind, part_number, false, message, Some(cause.to_string())) {
        Ok(phase) => PhaseFailure {
            phase,
            cause,
            status: status.snapshot(),
        },
        Err(_) => detached_failure(status, kind, part_number, message, cause),
    }
}

/// Failure whose phase could not be appended to the history.
fn detached_failure(
    status: &SharedStatus,
    kind: PhaseKind,
    part_number: Option<u32>,
    message: &str,
    cause: UploadError,
) -> PhaseFailure {
    PhaseFailure {
        phase: Phase {
            kind,
            part_number,
            success: false,
            message: message.to_string(),
            error: Some(cause.to_string()),
        },
        cause,
        status: status.snapshot(),
    }
}
