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

/// Floor applied to both refresh intervals below, per `spec.md` §5: "a
/// configurable refresh interval (never below 10 seconds)".
pub const MIN_HEALTH_CHECK_INTERVAL_SECONDS: u64 = 10;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthConfig {
    /// Disables the (expensive) object-store read/write probe, leaving
    /// only the cheap KV probe in `GET /health`.
    #[serde(default)]
    pub s3_checks_disabled: bool,

    /// Minimum interval between object-store health probes.
    ///
    /// Default: 30s
    #[serde(default = "default_s3_interval")]
    pub s3_check_interval_seconds: u64,

    /// Minimum interval between overall health aggregation passes.
    ///
    /// Default: 10s
    #[serde(default = "default_overall_interval")]
    pub overall_check_interval_seconds: u64,
}

impl HealthConfig {
    /// Returns the configured S3 interval clamped to the floor.
    pub fn effective_s3_check_interval_seconds(&self) -> u64 {
        self.s3_check_interval_seconds
            .max(MIN_HEALTH_CHECK_INTERVAL_SECONDS)
    }

    /// Returns the configured overall interval clamped to the floor.
    pub fn effective_overall_check_interval_seconds(&self) -> u64 {
        self.overall_check_interval_seconds
            .max(MIN_HEALTH_CHECK_INTERVAL_SECONDS)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            s3_checks_disabled: false,
            s3_check_interval_seconds: default_s3_interval(),
            overall_check_interval_seconds: default_overall_interval(),
        }
    }
}

const fn default_s3_interval() -> u64 {
    30
}

const fn default_overall_interval() -> u64 {
    10
}
