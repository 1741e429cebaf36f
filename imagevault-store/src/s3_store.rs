// Copyright 2024 The Imagevault Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! S3-compatible implementation of the Object Store Adapter (C1), on
//! `aws-sdk-s3`. Single-PUT vs. multipart selection and part sizing follow
//! `spec.md` §4.1 exactly; everything above this module sees identical
//! observable behavior either way.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use imagevault_config::store::{
    ObjectStoreConfig, MULTIPART_MAX_CONCURRENT_PARTS, MULTIPART_PART_SIZE_BYTES,
    MULTIPART_THRESHOLD_BYTES,
};
use imagevault_error::{make_err, Code, Error, ResultExt};
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::trait_def::{ByteStream, FileMetadata, ObjectInfo, ObjectStore};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    key_prefix: String,
}

impl S3ObjectStore {
    pub async fn new(config: &ObjectStoreConfig) -> Result<Self, Error> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "imagevault-config",
            ));
        }
        let shared_config = loader.load().await;
        let client = Client::new(&shared_config);
        Ok(S3ObjectStore {
            client,
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone().unwrap_or_default(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn single_put(
        &self,
        key: &str,
        mut stream: ByteStream,
        size: u64,
        content_type: &str,
    ) -> Result<(), Error> {
        let mut buf = Vec::with_capacity(size as usize);
        stream
            .read_to_end(&mut buf)
            .await
            .err_tip(|| "Failed to read upload body into memory for single-PUT")?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(SdkByteStream::from(buf))
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 PutObject failed: {e}"))?;
        Ok(())
    }

    async fn multipart_put(
        &self,
        key: &str,
        mut stream: ByteStream,
        content_type: &str,
    ) -> Result<(), Error> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 CreateMultipartUpload failed: {e}"))?;
        let upload_id = create
            .upload_id()
            .err_tip(|| "S3 did not return an upload_id")?
            .to_string();

        let semaphore = Arc::new(Semaphore::new(MULTIPART_MAX_CONCURRENT_PARTS));
        let mut part_futures = Vec::new();
        let mut part_number: i32 = 1;
        let mut read_err: Option<Error> = None;

        loop {
            let mut part_buf = vec![0u8; MULTIPART_PART_SIZE_BYTES as usize];
            let mut filled = 0usize;
            while filled < part_buf.len() {
                match stream.read(&mut part_buf[filled..]).await {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) => {
                        read_err = Some(e.into());
                        break;
                    }
                }
            }
            if read_err.is_some() {
                break;
            }
            part_buf.truncate(filled);
            if part_buf.is_empty() {
                break;
            }

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = key.to_string();
            let upload_id_clone = upload_id.clone();
            let this_part_number = part_number;
            part_number += 1;
            part_futures.push(tokio::spawn(async move {
                let _permit = permit;
                let resp = client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id_clone)
                    .part_number(this_part_number)
                    .body(SdkByteStream::from(part_buf))
                    .send()
                    .await
                    .map_err(|e| make_err!(Code::Unavailable, "S3 UploadPart failed: {e}"))?;
                let e_tag = resp.e_tag().map(|s| s.to_string());
                Result::<CompletedPart, Error>::Ok(
                    CompletedPart::builder()
                        .set_e_tag(e_tag)
                        .part_number(this_part_number)
                        .build(),
                )
            }));
        }

        let mut completed_parts = Vec::with_capacity(part_futures.len());
        let mut first_err: Option<Error> = read_err;
        for fut in part_futures {
            match fut.await {
                Ok(Ok(part)) => completed_parts.push(part),
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    first_err.get_or_insert(make_err!(Code::Internal, "S3 upload part task panicked: {e}"));
                }
            }
        }

        if let Some(err) = first_err {
            let _ = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await;
            return Err(err);
        }

        completed_parts.sort_by_key(|p| p.part_number().unwrap_or(0));
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 CompleteMultipartUpload failed: {e}"))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        key: &str,
        stream: ByteStream,
        size: u64,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let key = self.full_key(key);
        if cancel.is_cancelled() {
            return Err(make_err!(Code::Unavailable, "upload cancelled before starting"));
        }
        if size >= MULTIPART_THRESHOLD_BYTES {
            self.multipart_put(&key, stream, content_type).await
        } else {
            self.single_put(&key, stream, size, content_type).await
        }
    }

    async fn download(&self, key: &str, cancel: &CancellationToken) -> Result<ByteStream, Error> {
        let key = self.full_key(key);
        if cancel.is_cancelled() {
            return Err(make_err!(Code::Unavailable, "download cancelled before starting"));
        }
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_get_error(&key, e))?;
        Ok(Box::new(resp.body.into_async_read()))
    }

    async fn delete(&self, key: &str, _cancel: &CancellationToken) -> Result<(), Error> {
        let key = self.full_key(key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 DeleteObject failed: {e}"))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let full_prefix = self.full_key(prefix);
        let mut continuation: Option<String> = None;
        loop {
            if cancel.is_cancelled() {
                return Err(make_err!(Code::Unavailable, "delete_prefix cancelled"));
            }
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| make_err!(Code::Unavailable, "S3 ListObjectsV2 failed: {e}"))?;
            let keys: Vec<_> = resp
                .contents()
                .iter()
                .filter_map(|o| o.key().map(|k| k.to_string()))
                .collect();
            for chunk in keys.chunks(1000) {
                let ids: Vec<_> = chunk
                    .iter()
                    .map(|k| {
                        aws_sdk_s3::types::ObjectIdentifier::builder()
                            .key(k)
                            .build()
                            .expect("key is always set")
                    })
                    .collect();
                if ids.is_empty() {
                    continue;
                }
                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(
                        aws_sdk_s3::types::Delete::builder()
                            .set_objects(Some(ids))
                            .build()
                            .map_err(|e| make_err!(Code::Internal, "Failed to build batch delete request: {e}"))?,
                    )
                    .send()
                    .await
                    .map_err(|e| make_err!(Code::Unavailable, "S3 DeleteObjects batch failed: {e}"))?;
            }
            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }
        Ok(())
    }

    async fn exists(&self, key: &str, cancel: &CancellationToken) -> Result<bool, Error> {
        match self.head(key, cancel).await {
            Ok(_) => Ok(true),
            Err(e) if e.code == Code::NotFound => Ok(false),
            // Pessimistic on every other failure (including permission
            // denied), per `spec.md` §4.1 — required for dedup
            // correctness on backends that deny HEAD.
            Err(_) => Ok(true),
        }
    }

    async fn head(&self, key: &str, _cancel: &CancellationToken) -> Result<FileMetadata, Error> {
        let full_key = self.full_key(key);
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| map_head_error(&full_key, e))?;
        Ok(FileMetadata {
            size: resp.content_length().unwrap_or(0).max(0) as u64,
            content_type: resp.content_type().map(|s| s.to_string()),
            last_modified_unix_secs: resp.last_modified().and_then(|t| t.secs().try_into().ok()),
        })
    }

    async fn presign_get(
        &self,
        key: &str,
        expiry_seconds: u64,
        _cancel: &CancellationToken,
    ) -> Result<String, Error> {
        let full_key = self.full_key(key);
        let presign_config = PresigningConfig::expires_in(Duration::from_secs(expiry_seconds))
            .map_err(|e| make_err!(Code::Internal, "Invalid presign expiry: {e}"))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .presigned(presign_config)
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 presign failed: {e}"))?;
        Ok(presigned.uri().to_string())
    }

    async fn list(
        &self,
        prefix: &str,
        max: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ObjectInfo>, Error> {
        let full_prefix = self.full_key(prefix);
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full_prefix)
            .max_keys(max as i32)
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 ListObjectsV2 failed: {e}"))?;
        Ok(resp
            .contents()
            .iter()
            .filter_map(|o| {
                Some(ObjectInfo {
                    key: o.key()?.to_string(),
                    size: o.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect())
    }

    async fn copy(&self, src: &str, dst: &str, _cancel: &CancellationToken) -> Result<(), Error> {
        let full_src = self.full_key(src);
        let full_dst = self.full_key(dst);
        let copy_source = format!("{}/{}", self.bucket, full_src);
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&full_dst)
            .copy_source(copy_source)
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 CopyObject failed: {e}"))?;
        Ok(())
    }

    async fn health(&self, cancel: &CancellationToken) -> Result<(), Error> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 health read probe failed: {e}"))?;

        let probe_key = self.full_key(&format!(".imagevault-health/{}", uuid::Uuid::new_v4()));
        if cancel.is_cancelled() {
            return Err(make_err!(Code::Unavailable, "health check cancelled"));
        }
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&probe_key)
            .body(SdkByteStream::from(Vec::new()))
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 health write probe failed: {e}"))?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&probe_key)
            .send()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "S3 health probe cleanup failed: {e}"))?;
        Ok(())
    }
}

fn map_get_error(key: &str, e: SdkError<aws_sdk_s3::operation::get_object::GetObjectError>) -> Error {
    if matches!(
        e.as_service_error(),
        Some(aws_sdk_s3::operation::get_object::GetObjectError::NoSuchKey(_))
    ) {
        make_err!(Code::NotFound, "Object not found: {key}")
    } else {
        make_err!(Code::Unavailable, "S3 GetObject failed for {key}: {e}")
    }
}

fn map_head_error(key: &str, e: SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>) -> Error {
    if matches!(
        e.as_service_error(),
        Some(aws_sdk_s3::operation::head_object::HeadObjectError::NotFound(_))
    ) {
        make_err!(Code::NotFound, "Object not found: {key}")
    } else {
        make_err!(Code::Unavailable, "S3 HeadObject failed for {key}: {e}")
    }
}
