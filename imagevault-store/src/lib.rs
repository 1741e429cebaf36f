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

//! Object Store Adapter (C1): stream-oriented blob I/O against an
//! S3-compatible endpoint, with multipart upload above a fixed size
//! threshold and a cached health probe.

pub mod cached_health;
pub mod memory_store;
pub mod s3_store;
pub mod trait_def;

pub use cached_health::{CachedHealth, HealthCachedStore};
pub use memory_store::MemoryObjectStore;
pub use s3_store::S3ObjectStore;
pub use trait_def::{ByteStream, FileMetadata, ObjectInfo, ObjectStore};

use std::time::Duration;

use imagevault_config::health::HealthConfig;
use imagevault_config::store::ObjectStoreConfig;
use imagevault_error::Error;

/// Builds the configured `ObjectStore` backend, wrapped in a
/// `HealthCachedStore` so `health()` is throttled to `health_config`'s
/// refresh interval rather than probing the backend on every call, per
/// `spec.md` §5/§9. There is currently one real backend (S3-compatible);
/// the in-memory fake is test-only and not reachable through
/// configuration.
pub async fn open(config: &ObjectStoreConfig, health_config: &HealthConfig) -> Result<HealthCachedStore<S3ObjectStore>, Error> {
    let store = S3ObjectStore::new(config).await?;
    let refresh = Duration::from_secs(health_config.effective_s3_check_interval_seconds());
    Ok(HealthCachedStore::new(store, refresh, health_config.s3_checks_disabled))
}
