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

//! Embedded KV backend on top of `fjall`, an embedded LSM-tree. No
//! external service is required; this is the store used for single-node
//! deployments and for tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use imagevault_error::{make_err, Code, Error, ResultExt};
use imagevault_util::metrics::HitMissCounters;

use crate::trait_def::{KvBackendKind, KvEntry, KvScan, KvStore};

const PARTITION_NAME: &str = "imagevault";

/// A value as stored on disk: an 8-byte little-endian expiry (unix
/// seconds, `0` meaning "never") followed by the opaque payload.
fn encode_with_expiry(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    let expires_at: u64 = match ttl {
        Some(d) if !d.is_zero() => {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            (now + d).as_secs()
        }
        _ => 0,
    };
    let mut out = Vec::with_capacity(8 + value.len());
    out.extend_from_slice(&expires_at.to_le_bytes());
    out.extend_from_slice(value);
    out
}

/// Returns `None` if the stored value has expired, otherwise the payload.
fn decode_with_expiry(raw: &[u8]) -> Option<&[u8]> {
    if raw.len() < 8 {
        return Some(raw);
    }
    let (header, payload) = raw.split_at(8);
    let expires_at = u64::from_le_bytes(header.try_into().unwrap());
    if expires_at == 0 {
        return Some(payload);
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    if now >= expires_at {
        None
    } else {
        Some(payload)
    }
}

pub struct EmbeddedKvStore {
    #[allow(dead_code)]
    keyspace: Keyspace,
    partition: PartitionHandle,
    url_cache_counters: HitMissCounters,
}

impl EmbeddedKvStore {
    pub fn open(data_dir: &str) -> Result<Self, Error> {
        let keyspace = Config::new(data_dir)
            .open()
            .map_err(|e| make_err!(Code::Fatal, "Failed to open embedded KV store at {data_dir}: {e}"))?;
        let partition = keyspace
            .open_partition(PARTITION_NAME, PartitionCreateOptions::default())
            .map_err(|e| make_err!(Code::Fatal, "Failed to open embedded KV partition: {e}"))?;
        Ok(EmbeddedKvStore {
            keyspace,
            partition,
            url_cache_counters: HitMissCounters::new(),
        })
    }

    /// Hit/miss counters for the URL cache path, maintained atomically per
    /// `spec.md` §4.2.
    pub fn url_cache_counters(&self) -> &HitMissCounters {
        &self.url_cache_counters
    }
}

struct EmbeddedScan {
    entries: std::vec::IntoIter<(String, Vec<u8>)>,
}

#[async_trait]
impl KvScan for EmbeddedScan {
    async fn next(&mut self) -> Result<Option<KvEntry>, Error> {
        loop {
            match self.entries.next() {
                None => return Ok(None),
                Some((key, raw)) => {
                    if let Some(payload) = decode_with_expiry(&raw) {
                        return Ok(Some(KvEntry {
                            key,
                            value: Bytes::copy_from_slice(payload),
                        }));
                    }
                    // Expired entry encountered mid-scan; skip it rather
                    // than surfacing stale data.
                }
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), Error> {
        Ok(())
    }
}

#[async_trait]
impl KvStore for EmbeddedKvStore {
    fn kind(&self) -> KvBackendKind {
        KvBackendKind::Embedded
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let key = key.to_string();
        let partition = self.partition.clone();
        let raw = tokio::task::spawn_blocking(move || partition.get(key.as_bytes()))
            .await
            .map_err(|e| make_err!(Code::Internal, "embedded KV get task panicked: {e}"))?
            .map_err(|e| make_err!(Code::Internal, "embedded KV get failed: {e}"))?;
        match raw {
            None => Ok(None),
            Some(slice) => Ok(decode_with_expiry(&slice).map(Bytes::copy_from_slice)),
        }
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), Error> {
        let key = key.to_string();
        let encoded = encode_with_expiry(&value, ttl);
        let partition = self.partition.clone();
        tokio::task::spawn_blocking(move || partition.insert(key.as_bytes(), encoded))
            .await
            .map_err(|e| make_err!(Code::Internal, "embedded KV put task panicked: {e}"))?
            .map_err(|e| make_err!(Code::Internal, "embedded KV put failed: {e}"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        let partition = self.partition.clone();
        tokio::task::spawn_blocking(move || partition.remove(key.as_bytes()))
            .await
            .map_err(|e| make_err!(Code::Internal, "embedded KV delete task panicked: {e}"))?
            .map_err(|e| make_err!(Code::Internal, "embedded KV delete failed: {e}"))?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Box<dyn KvScan>, Error> {
        let prefix = prefix.to_string();
        let partition = self.partition.clone();
        let entries = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for item in partition.prefix(prefix.as_bytes()) {
                let (k, v) = item.map_err(|e| make_err!(Code::Internal, "embedded KV scan failed: {e}"))?;
                out.push((String::from_utf8_lossy(&k).into_owned(), v.to_vec()));
            }
            out.sort_by(|a, b| a.0.cmp(&b.0));
            Result::<_, Error>::Ok(out)
        })
        .await
        .map_err(|e| make_err!(Code::Internal, "embedded KV scan task panicked: {e}"))??;
        Ok(Box::new(EmbeddedScan {
            entries: entries.into_iter(),
        }))
    }

    async fn health(&self) -> Result<(), Error> {
        // A cheap read probe; the embedded store has no separate write
        // capability to verify since it IS the local disk.
        self.get("__imagevault_health_probe__")
            .await
            .err_tip(|| "embedded KV health probe failed")?;
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.keyspace
            .persist(fjall::PersistMode::SyncAll)
            .map_err(|e| make_err!(Code::Internal, "Failed to flush embedded KV store: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn open_tmp() -> (tempfile::TempDir, EmbeddedKvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddedKvStore::open(dir.path().to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_dir, store) = open_tmp();
        store.put("k1", Bytes::from_static(b"v1"), None).await.unwrap();
        let v = store.get("k1").await.unwrap();
        assert_eq!(v.unwrap(), Bytes::from_static(b"v1"));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (_dir, store) = open_tmp();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = open_tmp();
        store.put("k1", Bytes::from_static(b"v1"), None).await.unwrap();
        store.delete("k1").await.unwrap();
        store.delete("k1").await.unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ttl_zero_never_expires() {
        let (_dir, store) = open_tmp();
        store
            .put("k1", Bytes::from_static(b"v1"), Some(Duration::from_secs(0)))
            .await
            .unwrap();
        assert!(store.get("k1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ttl_in_the_past_expires_immediately() {
        let (_dir, store) = open_tmp();
        // Encode directly with an expiry of 1 (1970) to avoid sleeping in
        // a test.
        let encoded = encode_with_expiry(b"v1", None);
        // Corrupt the expiry to a time already in the past.
        let mut encoded = encoded;
        encoded[0..8].copy_from_slice(&1u64.to_le_bytes());
        store.partition.insert(b"k1".as_slice(), encoded).unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_returns_lexicographic_prefix_matches() {
        let (_dir, store) = open_tmp();
        store.put("image:metadata:b", Bytes::from_static(b"1"), None).await.unwrap();
        store.put("image:metadata:a", Bytes::from_static(b"2"), None).await.unwrap();
        store.put("dedup:x", Bytes::from_static(b"3"), None).await.unwrap();
        let entries = crate::trait_def::collect_scan(&store, "image:metadata:").await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec!["image:metadata:a", "image:metadata:b"]);
    }

    #[tokio::test]
    async fn fields_default_round_trip_as_json() {
        let (_dir, store) = open_tmp();
        let mut fields = HashMap::new();
        fields.insert("width".to_string(), "100".to_string());
        store.put_fields("image:metadata:x", &fields, None).await.unwrap();
        let read_back = store.get_fields("image:metadata:x").await.unwrap().unwrap();
        assert_eq!(read_back.get("width"), Some(&"100".to_string()));
    }
}
