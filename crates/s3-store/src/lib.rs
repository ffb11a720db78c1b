//! [`ObjectStore`] backed by the AWS S3 SDK.
//!
//! The client is configured with `force_path_style(true)` so S3-compatible
//! endpoints (MinIO, LocalStack, Ceph) work without DNS-style bucket hosts.

use std::fmt::Debug;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{
    ChecksumAlgorithm as SdkChecksumAlgorithm, CompletedMultipartUpload, CompletedPart,
    Part as SdkPart,
};
use chrono::{DateTime, Utc};
use s3check_credentials::ResolvedTarget;
use s3check_upload::{
    ChecksumAlgorithm, CompleteUploadOutput, CompleteUploadRequest, ListedPart, ObjectStore,
    Operation, StoreError, StoreFuture, UploadPartOutput, UploadPartRequest, UploadTarget,
};
use tracing::debug;

/// Name reported for credentials passed in explicitly.
const PROVIDER_NAME: &str = "s3check";

/// S3 client wrapper implementing the multipart operations.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    /// Builds a client for `target`.
    ///
    /// Without static credentials the SDK default provider chain is used.
    pub async fn connect(target: &ResolvedTarget) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(target.region.clone()));
        if let Some(creds) = &target.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key.clone(),
                creds.secret_key.clone(),
                None,
                None,
                PROVIDER_NAME,
            ));
        }
        if let Some(endpoint) = &target.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(true)
            .build();

        debug!(
            region = %target.region,
            endpoint = ?target.endpoint_url,
            static_credentials = target.credentials.is_some(),
            "S3 client configured"
        );
        Self {
            client: S3Client::from_conf(s3_config),
        }
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }
}

impl ObjectStore for S3Store {
    fn create_upload<'a>(
        &'a self,
        target: &'a UploadTarget,
        algorithm: ChecksumAlgorithm,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let resp = self
                .client
                .create_multipart_upload()
                .bucket(&target.bucket)
                .key(&target.key)
                .checksum_algorithm(sdk_algorithm(algorithm))
                .send()
                .await
                .map_err(|e| remote_error(Operation::CreateUpload, e))?;
            resp.upload_id().map(str::to_string).ok_or_else(|| {
                StoreError::new(Operation::CreateUpload, "response carried no upload id")
            })
        })
    }

    fn upload_part<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
        request: UploadPartRequest,
    ) -> StoreFuture<'a, UploadPartOutput> {
        Box::pin(async move {
            let part_number = sdk_part_number(Operation::UploadPart, request.part_number)?;
            let resp = self
                .client
                .upload_part()
                .bucket(&target.bucket)
                .key(&target.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .checksum_crc32(request.checksum_crc32)
                .body(ByteStream::from(request.body))
                .send()
                .await
                .map_err(|e| remote_error(Operation::UploadPart, e))?;
            Ok(UploadPartOutput {
                etag: resp.e_tag().unwrap_or_default().to_string(),
                checksum_crc32: resp.checksum_crc32().map(str::to_string),
            })
        })
    }

    fn list_parts<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
    ) -> StoreFuture<'a, Vec<ListedPart>> {
        Box::pin(async move {
            let mut parts = Vec::new();
            let mut marker: Option<String> = None;
            loop {
                let resp = self
                    .client
                    .list_parts()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .upload_id(upload_id)
                    .set_part_number_marker(marker.take())
                    .send()
                    .await
                    .map_err(|e| remote_error(Operation::ListParts, e))?;
                parts.extend(resp.parts().iter().map(listed_part));

                if !resp.is_truncated().unwrap_or(false) {
                    break;
                }
                match resp.next_part_number_marker() {
                    Some(next) => marker = Some(next.to_string()),
                    None => break,
                }
            }
            debug!(upload_id, parts = parts.len(), "listed parts");
            Ok(parts)
        })
    }

    fn complete_upload<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
        request: CompleteUploadRequest,
    ) -> StoreFuture<'a, CompleteUploadOutput> {
        Box::pin(async move {
            let parts = request
                .parts
                .iter()
                .map(|p| {
                    Ok(CompletedPart::builder()
                        .part_number(sdk_part_number(Operation::CompleteUpload, p.part_number)?)
                        .e_tag(&p.etag)
                        .checksum_crc32(&p.checksum_crc32)
                        .build())
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            let upload = CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build();

            let resp = self
                .client
                .complete_multipart_upload()
                .bucket(&target.bucket)
                .key(&target.key)
                .upload_id(upload_id)
                .multipart_upload(upload)
                .set_checksum_crc32(request.checksum_crc32)
                .send()
                .await
                .map_err(|e| remote_error(Operation::CompleteUpload, e))?;

            Ok(CompleteUploadOutput {
                location: resp.location().map(str::to_string),
                etag: resp.e_tag().map(str::to_string),
                version_id: resp.version_id().map(str::to_string),
                checksum_crc32: resp.checksum_crc32().map(str::to_string),
            })
        })
    }

    fn abort_upload<'a>(
        &'a self,
        target: &'a UploadTarget,
        upload_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .abort_multipart_upload()
                .bucket(&target.bucket)
                .key(&target.key)
                .upload_id(upload_id)
                .send()
                .await
                .map_err(|e| remote_error(Operation::AbortUpload, e))?;
            Ok(())
        })
    }
}

fn sdk_algorithm(algorithm: ChecksumAlgorithm) -> SdkChecksumAlgorithm {
    match algorithm {
        ChecksumAlgorithm::Crc32 => SdkChecksumAlgorithm::Crc32,
    }
}

fn sdk_part_number(operation: Operation, part_number: u32) -> Result<i32, StoreError> {
    i32::try_from(part_number)
        .map_err(|_| StoreError::new(operation, format!("part number {part_number} out of range")))
}

fn listed_part(part: &SdkPart) -> ListedPart {
    ListedPart {
        part_number: part
            .part_number()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        size: part.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
        etag: part.e_tag().unwrap_or_default().to_string(),
        checksum_crc32: part.checksum_crc32().map(str::to_string),
        last_modified: part.last_modified().and_then(to_chrono),
    }
}

fn to_chrono(time: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

/// Service error code and message when the server sent one, the full
/// error chain otherwise.
fn remote_error<E, R>(operation: Operation, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let message = match err.code() {
        Some(code) => format!("{code}: {}", err.message().unwrap_or("no message")),
        None => DisplayErrorContext(&err).to_string(),
    };
    StoreError::new(operation, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3check_credentials::StaticCredentials;

    #[test]
    fn part_numbers_convert() {
        assert_eq!(sdk_part_number(Operation::UploadPart, 1).unwrap(), 1);
        let err = sdk_part_number(Operation::UploadPart, u32::MAX).unwrap_err();
        assert_eq!(err.operation, Operation::UploadPart);
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn listed_part_maps_fields() {
        let part = SdkPart::builder()
            .part_number(3)
            .size(5)
            .e_tag("\"abc\"")
            .checksum_crc32("y/Q5Jg==")
            .last_modified(SdkDateTime::from_secs(1_700_000_000))
            .build();

        let listed = listed_part(&part);
        assert_eq!(listed.part_number, 3);
        assert_eq!(listed.size, 5);
        assert_eq!(listed.etag, "\"abc\"");
        assert_eq!(listed.checksum_crc32.as_deref(), Some("y/Q5Jg=="));
        assert_eq!(listed.last_modified.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn listed_part_without_checksum() {
        let part = SdkPart::builder().part_number(1).build();
        let listed = listed_part(&part);
        assert_eq!(listed.checksum_crc32, None);
        assert_eq!(listed.size, 0);
    }

    #[tokio::test]
    async fn connect_applies_region_and_endpoint() {
        let target = ResolvedTarget {
            credentials: Some(StaticCredentials {
                access_key: "AKIDEXAMPLE".into(),
                secret_key: "secret".into(),
            }),
            region: "eu-west-1".into(),
            endpoint_url: Some("http://localhost:9000".into()),
        };
        let store = S3Store::connect(&target).await;
        let config = store.client().config();
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
    }
}
