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

//! Remote KV backend on a Redis-compatible server. Metadata hashes use
//! native `HSET`/`HGETALL` so the wire format really is a flat field/value
//! map per key, as `spec.md` §6 requires for the remote path.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use imagevault_error::{make_err, Code, Error};
use redis::AsyncCommands;

use crate::trait_def::{KvBackendKind, KvEntry, KvScan, KvStore};

pub struct RedisKvStore {
    manager: redis::aio::ConnectionManager,
    operation_timeout: Duration,
}

impl RedisKvStore {
    pub async fn connect(
        url: &str,
        operation_timeout: Duration,
    ) -> Result<Self, Error> {
        let client =
            redis::Client::open(url).map_err(|e| make_err!(Code::Fatal, "Invalid redis url: {e}"))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| make_err!(Code::Fatal, "Failed to connect to redis: {e}"))?;
        Ok(RedisKvStore {
            manager,
            operation_timeout,
        })
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, Error> {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| make_err!(Code::Unavailable, "redis operation timed out"))?
            .map_err(|e| make_err!(Code::Unavailable, "redis error: {e}"))
    }
}

struct RedisScan {
    entries: std::vec::IntoIter<(String, Vec<u8>)>,
}

#[async_trait]
impl KvScan for RedisScan {
    async fn next(&mut self) -> Result<Option<KvEntry>, Error> {
        Ok(self.entries.next().map(|(key, value)| KvEntry {
            key,
            value: Bytes::from(value),
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), Error> {
        Ok(())
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    fn kind(&self) -> KvBackendKind {
        KvBackendKind::Remote
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = self.with_timeout(conn.get(key)).await?;
        Ok(value.map(Bytes::from))
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(d) if !d.is_zero() => {
                let seconds = d.as_secs().max(1);
                self.with_timeout(conn.set_ex::<_, _, ()>(key, value.to_vec(), seconds))
                    .await?;
            }
            _ => {
                self.with_timeout(conn.set::<_, _, ()>(key, value.to_vec())).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        self.with_timeout(conn.del::<_, ()>(key)).await
    }

    async fn scan(&self, prefix: &str) -> Result<Box<dyn KvScan>, Error> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = self
                .with_timeout(redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(500)
                    .query_async(&mut conn))
                .await?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        // `SCAN` gives no ordering guarantee; sort client-side so the
        // contract ("lexicographic on raw bytes", spec.md §4.2) holds
        // regardless of backend. Documented as a known tradeoff in
        // DESIGN.md: this makes large scans on the remote backend O(n log n)
        // client-side instead of relying on server-side order.
        keys.sort();
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let value: Option<Vec<u8>> = self.with_timeout(conn.get(&key)).await?;
            if let Some(value) = value {
                entries.push((key, value));
            }
        }
        Ok(Box::new(RedisScan {
            entries: entries.into_iter(),
        }))
    }

    async fn health(&self) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        let _: String = self
            .with_timeout(redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        // `ConnectionManager` has no explicit close; dropping it closes
        // the underlying connections.
        Ok(())
    }

    async fn get_fields(&self, key: &str) -> Result<Option<HashMap<String, String>>, Error> {
        let mut conn = self.manager.clone();
        let map: HashMap<String, String> = self.with_timeout(conn.hgetall(key)).await?;
        if map.is_empty() {
            // Redis returns an empty map for a missing key; distinguish
            // "absent" from "empty hash" with EXISTS.
            let exists: bool = self.with_timeout(conn.exists(key)).await?;
            if !exists {
                return Ok(None);
            }
        }
        Ok(Some(map))
    }

    async fn put_fields(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        self.with_timeout(conn.del::<_, ()>(key)).await?;
        if !fields.is_empty() {
            self.with_timeout(conn.hset_multiple::<_, _, _, ()>(key, &fields.iter().collect::<Vec<_>>()))
                .await?;
        }
        if let Some(d) = ttl {
            if !d.is_zero() {
                self.with_timeout(conn.expire::<_, ()>(key, d.as_secs().max(1) as i64))
                    .await?;
            }
        }
        Ok(())
    }
}
