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

use async_trait::async_trait;
use imagevault_error::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// A boxed byte stream, used both for uploads (callers provide one) and
/// downloads (the adapter returns one). Matches the teacher's `ReaderType`
/// convention in `cas/store/s3_store.rs`.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin + 'static>;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified_unix_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// Stream-oriented blob I/O against an S3-compatible endpoint (C1).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        stream: ByteStream,
        size: u64,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Error>;

    async fn download(&self, key: &str, cancel: &CancellationToken) -> Result<ByteStream, Error>;

    /// Idempotent: deleting an absent key is not an error.
    async fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<(), Error>;

    /// Recursively removes every key under `prefix`.
    async fn delete_prefix(&self, prefix: &str, cancel: &CancellationToken) -> Result<(), Error>;

    /// Returns `false` on a confirmed NotFound. On a "permission denied"
    /// response this MUST return `true` (pessimistic), per `spec.md` §4.1
    /// — required for dedup correctness on backends that deny HEAD.
    async fn exists(&self, key: &str, cancel: &CancellationToken) -> Result<bool, Error>;

    async fn head(&self, key: &str, cancel: &CancellationToken) -> Result<FileMetadata, Error>;

    async fn presign_get(
        &self,
        key: &str,
        expiry_seconds: u64,
        cancel: &CancellationToken,
    ) -> Result<String, Error>;

    async fn list(
        &self,
        prefix: &str,
        max: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ObjectInfo>, Error>;

    async fn copy(&self, src: &str, dst: &str, cancel: &CancellationToken) -> Result<(), Error>;

    /// Succeeds only after both a read probe and a round-trip
    /// write-then-delete of a disposable object, per `spec.md` §4.1.
    async fn health(&self, cancel: &CancellationToken) -> Result<(), Error>;
}
