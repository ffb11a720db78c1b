//! In-memory `ObjectStore` for engine tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use rand::Rng;
use s3check_transfer::checksum_bytes;

use crate::error::StoreError;
use crate::store::{
    ChecksumAlgorithm, CompleteUploadOutput, CompleteUploadRequest, ListedPart, ObjectStore,
    Operation, StoreFuture, UploadPartOutput, UploadPartRequest, UploadTarget,
};

const BOGUS_CHECKSUM: &str = "ZZZZZZ==";

#[derive(Debug, Clone)]
struct StoredPart {
    etag: String,
    checksum: String,
    body: Bytes,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    uploads: HashMap<String, BTreeMap<u32, StoredPart>>,
    objects: HashMap<String, Bytes>,
    upload_attempts: HashMap<u32, usize>,
    completions: Vec<CompleteUploadRequest>,
    create_calls: usize,
    list_calls: usize,
    abort_calls: usize,
}

#[derive(Debug, Default)]
enum Delay {
    #[default]
    None,
    Fixed(Duration),
    RandomUpTo(u64),
}

/// Mock store with injectable failures and latency.
///
/// Bucket names containing uppercase letters are rejected at create time,
/// the way S3 answers with `InvalidBucketName`.
#[derive(Debug, Default)]
pub struct MockStore {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Delay,
    failing_parts: BTreeSet<u32>,
    fail_all_parts: bool,
    corrupt_echo: BTreeSet<u32>,
    corrupt_listing: BTreeSet<u32>,
    drop_listing_checksum: BTreeSet<u32>,
    fail_complete: bool,
    misreport_object: bool,
    fail_abort: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random_delays(mut self, max_ms: u64) -> Self {
        self.delay = Delay::RandomUpTo(max_ms);
        self
    }

    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.delay = Delay::Fixed(delay);
        self
    }

    pub fn fail_part(mut self, part_number: u32) -> Self {
        self.failing_parts.insert(part_number);
        self
    }

    pub fn fail_all_parts(mut self) -> Self {
        self.fail_all_parts = true;
        self
    }

    /// Echo a wrong checksum in the `UploadPart` response.
    pub fn corrupt_echo(mut self, part_number: u32) -> Self {
        self.corrupt_echo.insert(part_number);
        self
    }

    /// Report a wrong checksum for the part in `ListParts`.
    pub fn corrupt_listed_checksum(mut self, part_number: u32) -> Self {
        self.corrupt_listing.insert(part_number);
        self
    }

    pub fn drop_listed_checksum(mut self, part_number: u32) -> Self {
        self.drop_listing_checksum.insert(part_number);
        self
    }

    pub fn fail_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    /// Report a wrong whole-object checksum from `CompleteUpload`.
    pub fn misreport_object_checksum(mut self) -> Self {
        self.misreport_object = true;
        self
    }

    pub fn fail_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    /// Starts an upload directly, for tests below the orchestrator.
    pub async fn create(&self, target: &UploadTarget) -> String {
        self.create_upload(target, ChecksumAlgorithm::Crc32)
            .await
            .unwrap()
    }

    pub fn upload_attempts(&self, part_number: u32) -> usize {
        self.lock()
            .upload_attempts
            .get(&part_number)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_upload_attempts(&self) -> usize {
        self.lock().upload_attempts.values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn abort_calls(&self) -> usize {
        self.lock().abort_calls
    }

    pub fn completions(&self) -> Vec<CompleteUploadRequest> {
        self.lock().completions.clone()
    }

    /// Assembled object at `target`, if completion succeeded.
    pub fn object(&self, target: &UploadTarget) -> Option<Bytes> {
        self.lock().objects.get(&target.to_string()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    async fn delay(&self) {
        let wait = match self.delay {
            Delay::None => return,
            Delay::Fixed(d) => d,
            Delay::RandomUpTo(max) => Duration::from_millis(rand::thread_rng().gen_range(0..=max)),
        };
        tokio::time::sleep(wait).await;
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ObjectStore for MockStore {
    fn create_upload<'a>(
        &'a self,
        target: &'a UploadTarget,
        _algorithm: ChecksumAlgorithm,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.lock();
            state.create_calls += 1;
            if target.bucket.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(StoreError::new(
                    Operation::CreateUpload,
                    "InvalidBucketName: The specified bucket is not valid.",
                ));
            }
            state.next_id += 1;
            let id = format!("upload-{}", state.next_id);
            state.uploads.insert(id.clone(), BTreeMap::new());
            Ok(id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        _target: &'a UploadTarget,
        upload_id: &'a str,
        request: UploadPartRequest,
    ) -> StoreFuture<'a, UploadPartOutput> {
        Box::pin(async move {
            let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
            let number = request.part_number;
            *self.lock().upload_attempts.entry(number).or_default() += 1;

            self.delay().await;

            if self.fail_all_parts || self.failing_parts.contains(&number) {
                return Err(StoreError::new(
                    Operation::UploadPart,
                    format!("injected failure for part {number}"),
                ));
            }

            let etag = format!("\"etag-{number}\"");
            let echoed = if self.corrupt_echo.contains(&number) {
                BOGUS_CHECKSUM.to_string()
            } else {
                request.checksum_crc32.clone()
            };

            let mut state = self.lock();
            let parts = state.uploads.get_mut(upload_id).ok_or_else(|| {
                StoreError::new(Operation::UploadPart, format!("NoSuchUpload: {upload_id}"))
            })?;
            parts.insert(
                number,
                StoredPart {
                    etag: etag.clone(),
                    checksum: request.checksum_crc32,
                    body: request.body,
                },
            );
            Ok(UploadPartOutput {
                etag,
                checksum_crc32: Some(echoed),
            })
        })
    }

    fn list_parts<'a>(
        &'a self,
        _target: &'a UploadTarget,
        upload_id: &'a str,
    ) -> StoreFuture<'a, Vec<ListedPart>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.list_calls += 1;
            let parts = state.uploads.get(upload_id).ok_or_else(|| {
                StoreError::new(Operation::ListParts, format!("NoSuchUpload: {upload_id}"))
            })?;
            Ok(parts
                .iter()
                .map(|(&number, part)| {
                    let checksum = if self.drop_listing_checksum.contains(&number) {
                        None
                    } else if self.corrupt_listing.contains(&number) {
                        Some(BOGUS_CHECKSUM.to_string())
                    } else {
                        Some(part.checksum.clone())
                    };
                    ListedPart {
                        part_number: number,
                        size: part.body.len() as u64,
                        etag: part.etag.clone(),
                        checksum_crc32: checksum,
                        last_modified: Some(Utc::now()),
                    }
                })
                .collect())
        })
    }

    fn complete_upload<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
        request: CompleteUploadRequest,
    ) -> StoreFuture<'a, CompleteUploadOutput> {
        Box::pin(async move {
            let mut state = self.lock();
            state.completions.push(request.clone());
            if self.fail_complete {
                return Err(StoreError::new(
                    Operation::CompleteUpload,
                    "InternalError: injected",
                ));
            }
            let parts = state.uploads.remove(upload_id).ok_or_else(|| {
                StoreError::new(Operation::CompleteUpload, format!("NoSuchUpload: {upload_id}"))
            })?;

            let mut object = BytesMut::new();
            for part in &request.parts {
                let stored = parts.get(&part.part_number).ok_or_else(|| {
                    StoreError::new(
                        Operation::CompleteUpload,
                        format!("InvalidPart: {}", part.part_number),
                    )
                })?;
                object.extend_from_slice(&stored.body);
            }
            let object = object.freeze();
            let checksum = if self.misreport_object {
                BOGUS_CHECKSUM.to_string()
            } else {
                checksum_bytes(&object)
            };
            state.objects.insert(target.to_string(), object);

            Ok(CompleteUploadOutput {
                location: Some(format!("http://mock/{target}")),
                etag: Some(format!("\"etag-{}\"", request.parts.len())),
                version_id: None,
                checksum_crc32: Some(checksum),
            })
        })
    }

    fn abort_upload<'a>(
        &'a self,
        _target: &'a UploadTarget,
        upload_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.abort_calls += 1;
            if self.fail_abort {
                return Err(StoreError::new(
                    Operation::AbortUpload,
                    "AccessDenied: injected",
                ));
            }
            state.uploads.remove(upload_id);
            Ok(())
        })
    }
}
