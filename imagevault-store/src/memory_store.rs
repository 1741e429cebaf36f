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

//! In-memory `ObjectStore` fake used by integration tests in place of a live
//! S3-compatible endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use imagevault_error::{make_err, Code, Error, ResultExt};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::trait_def::{ByteStream, FileMetadata, ObjectInfo, ObjectStore};

#[derive(Clone)]
struct Entry {
    bytes: Arc<Vec<u8>>,
    content_type: Option<String>,
}

pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Entry>>,
    fail_health: std::sync::atomic::AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        MemoryObjectStore {
            objects: Mutex::new(BTreeMap::new()),
            fail_health: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Test hook: makes `health()` fail until called again with `false`.
    pub fn set_health_failing(&self, failing: bool) {
        self.fail_health
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        key: &str,
        mut stream: ByteStream,
        _size: u64,
        content_type: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .err_tip(|| "Failed to read upload body")?;
        self.objects.lock().await.insert(
            key.to_string(),
            Entry {
                bytes: Arc::new(buf),
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }

    async fn download(&self, key: &str, _cancel: &CancellationToken) -> Result<ByteStream, Error> {
        let entry = self
            .objects
            .lock()
            .await
            .get(key)
            .cloned()
            .err_tip_with_code(|_| (Code::NotFound, format!("Object not found: {key}")))?;
        Ok(Box::new(std::io::Cursor::new((*entry.bytes).clone())))
    }

    async fn delete(&self, key: &str, _cancel: &CancellationToken) -> Result<(), Error> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str, _cancel: &CancellationToken) -> Result<(), Error> {
        let mut objects = self.objects.lock().await;
        let keys: Vec<_> = objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str, _cancel: &CancellationToken) -> Result<bool, Error> {
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn head(&self, key: &str, _cancel: &CancellationToken) -> Result<FileMetadata, Error> {
        let entry = self
            .objects
            .lock()
            .await
            .get(key)
            .cloned()
            .err_tip_with_code(|_| (Code::NotFound, format!("Object not found: {key}")))?;
        Ok(FileMetadata {
            size: entry.bytes.len() as u64,
            content_type: entry.content_type,
            last_modified_unix_secs: None,
        })
    }

    async fn presign_get(
        &self,
        key: &str,
        expiry_seconds: u64,
        _cancel: &CancellationToken,
    ) -> Result<String, Error> {
        if !self.objects.lock().await.contains_key(key) {
            return Err(make_err!(Code::NotFound, "Object not found: {key}"));
        }
        Ok(format!("memory://{key}?expires_in={expiry_seconds}"))
    }

    async fn list(
        &self,
        prefix: &str,
        max: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ObjectInfo>, Error> {
        let objects = self.objects.lock().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(max)
            .map(|(k, v)| ObjectInfo {
                key: k.clone(),
                size: v.bytes.len() as u64,
            })
            .collect())
    }

    async fn copy(&self, src: &str, dst: &str, _cancel: &CancellationToken) -> Result<(), Error> {
        let mut objects = self.objects.lock().await;
        let entry = objects
            .get(src)
            .cloned()
            .err_tip_with_code(|_| (Code::NotFound, format!("Object not found: {src}")))?;
        objects.insert(dst.to_string(), entry);
        Ok(())
    }

    async fn health(&self, _cancel: &CancellationToken) -> Result<(), Error> {
        if self.fail_health.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(make_err!(Code::Unavailable, "memory store health forced to fail"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(data: &'static [u8]) -> ByteStream {
        Box::new(std::io::Cursor::new(data))
    }

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let store = MemoryObjectStore::new();
        let cancel = CancellationToken::new();
        store
            .upload("a/b", cursor(b"hello"), 5, "application/octet-stream", &cancel)
            .await
            .unwrap();
        let mut reader = store.download("a/b", &cancel).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn download_missing_key_is_not_found() {
        let store = MemoryObjectStore::new();
        let cancel = CancellationToken::new();
        let err = store.download("missing", &cancel).await.unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn delete_prefix_removes_only_matching_keys() {
        let store = MemoryObjectStore::new();
        let cancel = CancellationToken::new();
        store
            .upload("img/1/original", cursor(b"a"), 1, "image/jpeg", &cancel)
            .await
            .unwrap();
        store
            .upload("img/1/thumbnail", cursor(b"b"), 1, "image/jpeg", &cancel)
            .await
            .unwrap();
        store
            .upload("img/2/original", cursor(b"c"), 1, "image/jpeg", &cancel)
            .await
            .unwrap();
        store.delete_prefix("img/1/", &cancel).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.exists("img/2/original", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn exists_reflects_delete() {
        let store = MemoryObjectStore::new();
        let cancel = CancellationToken::new();
        store
            .upload("x", cursor(b"z"), 1, "image/png", &cancel)
            .await
            .unwrap();
        assert!(store.exists("x", &cancel).await.unwrap());
        store.delete("x", &cancel).await.unwrap();
        assert!(!store.exists("x", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn health_respects_test_hook() {
        let store = MemoryObjectStore::new();
        let cancel = CancellationToken::new();
        store.health(&cancel).await.unwrap();
        store.set_health_failing(true);
        assert!(store.health(&cancel).await.is_err());
    }
}
