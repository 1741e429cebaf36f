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
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// If true, reflects any `Origin` header. Mutually exclusive in
    /// practice with `allow_credentials`, since browsers reject wildcard
    /// origins on credentialed requests; validated at startup.
    #[serde(default)]
    pub allow_all_origins: bool,

    /// Explicit origin allow-list, used when `allow_all_origins` is false.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default)]
    pub allow_credentials: bool,
}
