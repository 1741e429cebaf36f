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

use serde::{Deserialize, Serialize};

/// KV backend selection. The two variants must present identical semantics
/// to every caller above `imagevault-kv`; only the persistence mechanism
/// differs.
#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum KvBackendConfig {
    /// Embedded LSM store (`fjall`). No external service required.
    embedded(EmbeddedKvConfig),

    /// Remote KV server (Redis-compatible). Shared across process
    /// instances.
    remote(RemoteKvConfig),
}

impl Default for KvBackendConfig {
    fn default() -> Self {
        KvBackendConfig::embedded(EmbeddedKvConfig::default())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmbeddedKvConfig {
    /// Directory on disk where the embedded store keeps its data files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for EmbeddedKvConfig {
    fn default() -> Self {
        EmbeddedKvConfig {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data/kv".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RemoteKvConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,

    /// Optional username, if the backend requires auth beyond a password
    /// embedded in the URL.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,

    /// Size of the connection pool held against the remote backend.
    ///
    /// Default: 10
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Per-operation timeout in milliseconds.
    ///
    /// Default: 2000
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_operation_timeout_ms() -> u64 {
    2000
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct KvConfig {
    pub backend: KvBackendConfig,

    /// TTL, in seconds, for cached presigned URL entries. Zero or absent
    /// means no expiry, which must never be used for the URL cache (see
    /// `spec.md` §4.2) — validated at startup.
    ///
    /// Default: 3300 (55 minutes, safely under a typical 1h presign expiry)
    #[serde(default = "default_url_cache_ttl_seconds")]
    pub url_cache_ttl_seconds: u64,
}

const fn default_url_cache_ttl_seconds() -> u64 {
    3300
}
