//! Bounded worker pool that uploads parts concurrently.
//!
//! The coordinator feeds parts through a rendezvous queue to `N` workers.
//! The first worker error is kept in a single-assignment cell and trips an
//! abort token; later errors are dropped. Once the token is tripped the
//! coordinator stops enqueueing and workers stop claiming new parts, while
//! parts already in flight finish. A single collector task records results
//! in part-number order.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use s3check_transfer::Part;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{UploadError, VerificationError};
use crate::phase::{PhaseKind, SharedStatus};
use crate::store::{ObjectStore, Operation, UploadPartRequest, UploadTarget};
use crate::types::{CompletedPart, PartInfo, UploadEvent};

/// Default number of concurrent upload workers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Every part uploaded, ascending by part number.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub completed: Vec<CompletedPart>,
    pub infos: Vec<PartInfo>,
}

/// The single error surfaced by a failed dispatch.
#[derive(Debug)]
pub struct DispatchFailure {
    /// Part whose upload failed (`None` if cancelled between parts).
    pub part_number: Option<u32>,
    pub error: UploadError,
    /// Parts that did complete before teardown.
    pub completed: DispatchOutcome,
}

struct PartResult {
    part: CompletedPart,
    info: PartInfo,
}

struct FirstError {
    part_number: Option<u32>,
    error: UploadError,
}

/// Uploads the parts of one multipart upload.
pub struct UploadDispatcher {
    store: Arc<dyn ObjectStore>,
    target: UploadTarget,
    upload_id: String,
    concurrency: usize,
    cancel: CancellationToken,
    status: SharedStatus,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    verbose: bool,
}

impl UploadDispatcher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        target: UploadTarget,
        upload_id: impl Into<String>,
        cancel: CancellationToken,
        status: SharedStatus,
        events_tx: mpsc::UnboundedSender<UploadEvent>,
    ) -> Self {
        Self {
            store,
            target,
            upload_id: upload_id.into(),
            concurrency: DEFAULT_CONCURRENCY,
            cancel,
            status,
            events_tx,
            verbose: false,
        }
    }

    /// Emits each raw `UploadPart` response as an event.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the worker count (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Uploads `parts` and returns them ascending, or the first failure.
    pub async fn dispatch(
        &self,
        parts: Vec<Part>,
        total_bytes: u64,
    ) -> Result<DispatchOutcome, DispatchFailure> {
        let (work_tx, work_rx) = flume::bounded::<Part>(0);
        let (result_tx, result_rx) = mpsc::channel::<PartResult>(self.concurrency);
        let first_error: Arc<OnceLock<FirstError>> = Arc::new(OnceLock::new());
        let aborted = self.cancel.child_token();

        let collector = tokio::spawn(collect_results(
            result_rx,
            first_part_number(&parts),
            total_bytes,
            self.status.clone(),
            self.events_tx.clone(),
        ));

        let workers: Vec<JoinHandle<()>> = (0..self.concurrency)
            .map(|id| {
                let worker = Worker {
                    id,
                    store: Arc::clone(&self.store),
                    target: self.target.clone(),
                    upload_id: self.upload_id.clone(),
                    cancel: self.cancel.clone(),
                    aborted: aborted.clone(),
                    first_error: Arc::clone(&first_error),
                    work_rx: work_rx.clone(),
                    result_tx: result_tx.clone(),
                    events_tx: self.verbose.then(|| self.events_tx.clone()),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        drop(work_rx);
        drop(result_tx);

        let mut stopped_at = None;
        for part in parts {
            let number = part.number();
            debug!(part = number, "queueing part");
            let _ = self.events_tx.send(UploadEvent::PartQueued {
                part_number: number,
            });

            let sent = tokio::select! {
                biased;
                _ = aborted.cancelled() => false,
                res = work_tx.send_async(part) => res.is_ok(),
            };
            if !sent {
                stopped_at = Some(number);
                break;
            }
        }

        // Teardown: close the queue, drain workers, then the collector.
        drop(work_tx);
        for handle in workers {
            if let Err(e) = handle.await {
                let _ = first_error.set(FirstError {
                    part_number: None,
                    error: UploadError::Worker(e.to_string()),
                });
            }
        }
        let collected = match collector.await {
            Ok(collected) => collected,
            Err(e) => {
                let _ = first_error.set(FirstError {
                    part_number: None,
                    error: UploadError::Worker(e.to_string()),
                });
                DispatchOutcome::default()
            }
        };

        let first = Arc::into_inner(first_error).and_then(OnceLock::into_inner);
        match first {
            Some(FirstError { part_number, error }) => Err(DispatchFailure {
                part_number,
                error,
                completed: collected,
            }),
            None if self.cancel.is_cancelled() => Err(DispatchFailure {
                part_number: stopped_at,
                error: UploadError::Cancelled,
                completed: collected,
            }),
            None => Ok(collected),
        }
    }
}

fn first_part_number(parts: &[Part]) -> u32 {
    parts.iter().map(Part::number).min().unwrap_or(1)
}

struct Worker {
    id: usize,
    store: Arc<dyn ObjectStore>,
    target: UploadTarget,
    upload_id: String,
    cancel: CancellationToken,
    aborted: CancellationToken,
    first_error: Arc<OnceLock<FirstError>>,
    work_rx: flume::Receiver<Part>,
    result_tx: mpsc::Sender<PartResult>,
    /// Set for verbose runs only.
    events_tx: Option<mpsc::UnboundedSender<UploadEvent>>,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.aborted.is_cancelled() {
                break;
            }
            let Ok(part) = self.work_rx.recv_async().await else {
                break;
            };
            let number = part.number();

            match self.upload(&part).await {
                Ok(result) => {
                    debug!(worker = self.id, part = number, "part uploaded");
                    if self.result_tx.send(result).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(worker = self.id, part = number, error = %error, "part upload failed");
                    let _ = self.first_error.set(FirstError {
                        part_number: Some(number),
                        error,
                    });
                    self.aborted.cancel();
                }
            }
        }
    }

    async fn upload(&self, part: &Part) -> Result<PartResult, UploadError> {
        let checksum = part.checksum().to_string();
        let request_dump = self.events_tx.as_ref().map(|_| {
            serde_json::json!({
                "Bucket": self.target.bucket,
                "Key": self.target.key,
                "UploadId": self.upload_id,
                "PartNumber": part.number(),
                "ContentLength": part.len(),
                "ChecksumCRC32": checksum,
            })
        });
        let request = UploadPartRequest {
            part_number: part.number(),
            body: part.data().clone(),
            checksum_crc32: checksum.clone(),
        };

        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
            res = self.store.upload_part(&self.target, &self.upload_id, request) => res?,
        };

        // A server that echoes a checksum must echo ours.
        if let Some(echoed) = output.checksum_crc32.as_deref()
            && echoed != checksum
        {
            return Err(VerificationError::ChecksumMismatch {
                part: part.number(),
                expected: checksum,
                actual: echoed.to_string(),
            }
            .into());
        }

        debug!(part = part.number(), etag = %output.etag, "upload response");
        if let (Some(events_tx), Some(request)) = (&self.events_tx, request_dump) {
            let _ = events_tx.send(UploadEvent::RemoteCall {
                operation: Operation::UploadPart,
                request,
                response: serde_json::to_value(&output).unwrap_or_default(),
            });
        }

        Ok(PartResult {
            part: CompletedPart {
                part_number: part.number(),
                etag: output.etag,
                checksum_crc32: checksum.clone(),
            },
            info: PartInfo {
                part_number: part.number(),
                size: part.len() as u64,
                checksum_crc32: checksum,
            },
        })
    }
}

/// Records results as one `PartUpload` phase each, in part-number order.
///
/// Results arriving ahead of a missing part wait in a reorder buffer; what is
/// still buffered when the channel closes is flushed in order.
async fn collect_results(
    mut result_rx: mpsc::Receiver<PartResult>,
    first_part: u32,
    total_bytes: u64,
    status: SharedStatus,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    let mut pending: BTreeMap<u32, PartResult> = BTreeMap::new();
    let mut next = first_part;
    let mut bytes_uploaded = 0u64;

    let mut record = |result: PartResult, outcome: &mut DispatchOutcome| {
        bytes_uploaded += result.info.size;
        let number = result.info.part_number;
        let message = format!("Uploaded and verified ({bytes_uploaded}/{total_bytes} bytes)");
        if let Err(e) = status.record(PhaseKind::PartUpload, Some(number), true, message, None) {
            warn!(part = number, error = %e, "failed to record part phase");
        }
        let _ = events_tx.send(UploadEvent::PartUploaded {
            part_number: number,
            size: result.info.size,
            bytes_uploaded,
            total_bytes,
        });
        outcome.completed.push(result.part);
        outcome.infos.push(result.info);
    };

    while let Some(result) = result_rx.recv().await {
        pending.insert(result.info.part_number, result);
        while let Some(ready) = pending.remove(&next) {
            record(ready, &mut outcome);
            next += 1;
        }
    }
    for (_, result) in std::mem::take(&mut pending) {
        record(result, &mut outcome);
    }

    outcome.completed.sort_by_key(|p| p.part_number);
    outcome.infos.sort_by_key(|p| p.part_number);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;
    use s3check_transfer::{Partitioner, Payload};
    use std::time::Duration;

    fn parts(text: &str, part_size: usize) -> Vec<Part> {
        Partitioner::with_min_part_size(part_size, 1)
            .unwrap()
            .parts(&Payload::from_text(text))
            .unwrap()
            .collect()
    }

    fn target() -> UploadTarget {
        UploadTarget {
            bucket: "bucket".into(),
            key: "key".into(),
        }
    }

    async fn dispatcher(
        store: Arc<MockStore>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> (UploadDispatcher, SharedStatus) {
        let upload_id = store.create(&target()).await;
        let status = SharedStatus::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let d = UploadDispatcher::new(
            store,
            target(),
            upload_id,
            cancel,
            status.clone(),
            events_tx,
        )
        .with_concurrency(concurrency);
        (d, status)
    }

    #[tokio::test]
    async fn uploads_every_part_once() {
        let store = Arc::new(MockStore::new().with_random_delays(5));
        let (d, status) = dispatcher(Arc::clone(&store), 4, CancellationToken::new()).await;

        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        let outcome = d.dispatch(parts(text, 3), text.len() as u64).await.unwrap();

        let numbers: Vec<u32> = outcome.completed.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
        for n in 1..=12 {
            assert_eq!(store.upload_attempts(n), 1, "part {n}");
        }
        assert!(store.max_in_flight() <= 4);

        // Phases appended in part order despite random completion order.
        let snapshot = status.snapshot();
        let recorded: Vec<u32> = snapshot
            .phases()
            .iter()
            .filter_map(|p| p.part_number)
            .collect();
        assert_eq!(recorded, numbers);
        let last = snapshot.last().unwrap();
        assert!(last.message.contains("36/36 bytes"));
    }

    #[tokio::test]
    async fn single_failure_surfaces_once() {
        let store = Arc::new(
            MockStore::new()
                .with_random_delays(3)
                .fail_part(5),
        );
        let (d, status) = dispatcher(Arc::clone(&store), 4, CancellationToken::new()).await;

        let failure = d
            .dispatch(parts(&"x".repeat(40), 2), 40)
            .await
            .unwrap_err();

        assert_eq!(failure.part_number, Some(5));
        assert!(matches!(failure.error, UploadError::Transport(_)));
        // Part 5 never succeeded and nothing was uploaded twice.
        assert_eq!(store.upload_attempts(5), 1);
        for n in 1..=20 {
            assert!(store.upload_attempts(n) <= 1);
        }
        let snapshot = status.snapshot();
        assert_eq!(snapshot.count(PhaseKind::PartUpload, false), 0);
        assert!(
            failure
                .completed
                .completed
                .iter()
                .all(|p| p.part_number != 5)
        );
    }

    #[tokio::test]
    async fn many_failures_still_one_error() {
        let store = Arc::new(MockStore::new().fail_all_parts());
        let (d, _) = dispatcher(Arc::clone(&store), 8, CancellationToken::new()).await;

        let failure = d.dispatch(parts(&"y".repeat(64), 4), 64).await.unwrap_err();
        assert!(failure.part_number.is_some());
        assert!(failure.completed.completed.is_empty());
        // No more than one part per worker got dispatched.
        assert!(store.total_upload_attempts() <= 8);
    }

    #[tokio::test]
    async fn stops_dispatching_after_failure() {
        let store = Arc::new(MockStore::new().fail_part(1));
        let (d, _) = dispatcher(Arc::clone(&store), 1, CancellationToken::new()).await;

        let failure = d.dispatch(parts(&"z".repeat(50), 5), 50).await.unwrap_err();
        assert_eq!(failure.part_number, Some(1));
        // With one worker, at most the part already handed over follows.
        assert!(store.total_upload_attempts() <= 2);
    }

    #[tokio::test]
    async fn echoed_checksum_mismatch_fails_part() {
        let store = Arc::new(MockStore::new().corrupt_echo(2));
        let (d, _) = dispatcher(Arc::clone(&store), 2, CancellationToken::new()).await;

        let failure = d.dispatch(parts("Hello, World", 5), 12).await.unwrap_err();
        assert_eq!(failure.part_number, Some(2));
        assert!(matches!(
            failure.error,
            UploadError::Verification(VerificationError::ChecksumMismatch { part: 2, .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_mid_flight() {
        let store = Arc::new(MockStore::new().with_fixed_delay(Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let (d, _) = dispatcher(Arc::clone(&store), 2, cancel.clone()).await;

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let failure = d.dispatch(parts(&"c".repeat(20), 2), 20).await.unwrap_err();
        assert!(matches!(failure.error, UploadError::Cancelled));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let store = Arc::new(MockStore::new());
        let cancel = CancellationToken::new();
        let (d, _) = dispatcher(Arc::clone(&store), 2, cancel.clone()).await;
        cancel.cancel();

        let failure = d.dispatch(parts("abcdef", 2), 6).await.unwrap_err();
        assert!(matches!(failure.error, UploadError::Cancelled));
        assert_eq!(store.total_upload_attempts(), 0);
    }
}
