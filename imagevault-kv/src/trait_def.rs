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

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use imagevault_error::{Code, Error};

/// Which physical backend a `KvStore` is. The Metadata Repository uses
/// this only to decide whether `get_fields`/`put_fields` have a native
/// hash-like implementation or fall back to the JSON-blob default — it
/// never branches observable behavior on it otherwise, per `spec.md`
/// §4.2's "MUST present identical semantics" requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackendKind {
    Embedded,
    Remote,
}

/// A single entry yielded by `scan`.
#[derive(Debug, Clone)]
pub struct KvEntry {
    pub key: String,
    pub value: Bytes,
}

/// A prefix scan in progress. Iteration is lexicographic on raw key bytes.
/// Callers must call `close` (or drop the iterator) before the read
/// transaction it was opened under ends, per `spec.md` §5's resource
/// discipline.
#[async_trait]
pub trait KvScan: Send {
    async fn next(&mut self) -> Result<Option<KvEntry>, Error>;

    /// Releases any underlying cursor/transaction. Implementations that
    /// hold no such resource may make this a no-op.
    async fn close(self: Box<Self>) -> Result<(), Error>;
}

/// Ordered key/value store with TTL entries and prefix iteration (C2).
/// Both the embedded and the remote implementation must present identical
/// semantics to every caller.
#[async_trait]
pub trait KvStore: Send + Sync {
    fn kind(&self) -> KvBackendKind;

    /// Fetches the raw value for `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error>;

    /// Stores `value` under `key`. `ttl` of `None` or zero means the entry
    /// never expires (used for metadata and dedup records); a positive TTL
    /// guarantees removal no later than its end (used for the URL cache).
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), Error>;

    /// Idempotent: deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Opens a lexicographic scan over every key starting with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Box<dyn KvScan>, Error>;

    async fn health(&self) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;

    /// Reads a flat field→value map stored under `key`. Default
    /// implementation decodes a JSON blob written by `put_fields`'s
    /// default — the encoding the embedded backend uses. Backends with a
    /// native hash type (Redis) override both methods.
    async fn get_fields(&self, key: &str) -> Result<Option<HashMap<String, String>>, Error> {
        match self.get(key).await? {
            Some(bytes) => {
                let map: HashMap<String, String> = serde_json::from_slice(&bytes)
                    .map_err(|e| imagevault_error::make_err!(Code::Internal, "Corrupt field map at {key}: {e}"))?;
                Ok(Some(map))
            }
            None => Ok(None),
        }
    }

    /// Writes a flat field→value map as a single JSON blob via `put`.
    async fn put_fields(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), Error> {
        let bytes = serde_json::to_vec(fields)
            .map_err(|e| imagevault_error::make_err!(Code::Internal, "Failed to encode field map: {e}"))?;
        self.put(key, Bytes::from(bytes), ttl).await
    }
}

/// Convenience used by callers that want every matching entry materialized
/// instead of streamed, draining and closing the scan for them.
pub async fn collect_scan(store: &dyn KvStore, prefix: &str) -> Result<Vec<KvEntry>, Error> {
    let mut scan = store.scan(prefix).await?;
    let mut out = Vec::new();
    while let Some(entry) = scan.next().await? {
        out.push(entry);
    }
    scan.close().await?;
    Ok(out)
}
