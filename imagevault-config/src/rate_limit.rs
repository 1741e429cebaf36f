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

/// Per-minute request budgets, enforced per API key (or per remote
/// address when auth is disabled).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RateLimitConfig {
    /// Uploads allowed per minute.
    ///
    /// Default: 30
    #[serde(default = "default_upload")]
    pub upload_per_minute: u32,

    /// Variant downloads allowed per minute.
    ///
    /// Default: 600
    #[serde(default = "default_download")]
    pub download_per_minute: u32,

    /// Metadata reads allowed per minute.
    ///
    /// Default: 300
    #[serde(default = "default_info")]
    pub info_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            upload_per_minute: default_upload(),
            download_per_minute: default_download(),
            info_per_minute: default_info(),
        }
    }
}

const fn default_upload() -> u32 {
    30
}

const fn default_download() -> u32 {
    600
}

const fn default_info() -> u32 {
    300
}
