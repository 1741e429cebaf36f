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

//! KV keyspace layout, per `spec.md` §3: `image:metadata:{id}`,
//! `image:cache:{id}:{resolution}`, `dedup:{fingerprint_key}`.

use imagevault_util::ImageId;

pub const METADATA_PREFIX: &str = "image:metadata:";
pub const CACHE_PREFIX: &str = "image:cache:";
pub const DEDUP_PREFIX: &str = "dedup:";

pub fn metadata_key(id: ImageId) -> String {
    format!("{METADATA_PREFIX}{id}")
}

pub fn cache_key(id: ImageId, resolution: &str) -> String {
    format!("{CACHE_PREFIX}{id}:{resolution}")
}

pub fn cache_prefix_for_image(id: ImageId) -> String {
    format!("{CACHE_PREFIX}{id}:")
}

pub fn dedup_key(fingerprint_storage_key: &str) -> String {
    format!("{DEDUP_PREFIX}{fingerprint_storage_key}")
}
