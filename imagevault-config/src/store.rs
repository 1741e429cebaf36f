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

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ObjectStoreConfig {
    /// S3-compatible endpoint URL. Leave unset to use the default AWS
    /// endpoint resolution for `region`.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bucket all objects are stored under.
    pub bucket: String,

    /// Region passed to the S3 client.
    #[serde(default = "default_region")]
    pub region: String,

    /// Access key. If unset, the client falls back to the default AWS
    /// credential provider chain (env vars, instance profile, etc.).
    #[serde(default)]
    pub access_key: Option<String>,

    /// Secret key, paired with `access_key`.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Whether to use TLS when talking to `endpoint`.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub tls: bool,

    /// How long presigned GET URLs remain valid, in seconds.
    ///
    /// Default: 3600 (1 hour)
    #[serde(default = "default_presign_expiry_seconds")]
    pub presign_expiry_seconds: u64,

    /// Prefix prepended to every object key, used to namespace multiple
    /// logical deployments inside a shared bucket.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

const fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

const fn default_presign_expiry_seconds() -> u64 {
    3600
}

/// Multipart upload thresholds. Not user-configurable — fixed by the
/// component contract in `spec.md` §4.1 — but kept as named constants here
/// rather than scattered magic numbers.
pub const MULTIPART_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;
pub const MULTIPART_PART_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const MULTIPART_MAX_CONCURRENT_PARTS: usize = 3;
