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

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Keys allowed to perform uploads and deletes in addition to reads.
    #[serde(default)]
    pub read_write_keys: Vec<String>,

    /// Keys allowed only to read metadata and download variants.
    #[serde(default)]
    pub read_only_keys: Vec<String>,

    /// HTTP header carrying the API key.
    ///
    /// Default: "X-API-Key"
    #[serde(default = "default_key_header_name")]
    pub key_header_name: String,
}

fn default_key_header_name() -> String {
    "X-API-Key".to_string()
}
