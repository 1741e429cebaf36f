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

use async_trait::async_trait;
use imagevault_error::Error;

/// Implemented by every component that `GET /health` needs to probe (the
/// KV backend, the object store). Mirrors the teacher's
/// `HealthStatusIndicator` convention.
#[async_trait]
pub trait HealthStatusIndicator: Send + Sync {
    /// A short, stable name used in the health response body.
    fn component_name(&self) -> &'static str;

    /// Performs the probe. `Ok(())` means healthy.
    async fn check_health(&self) -> Result<(), Error>;
}

/// One entry in an aggregated health report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Runs every indicator and collects the results; never short-circuits on
/// the first failure so a caller sees the full picture.
pub async fn check_all(indicators: &[&(dyn HealthStatusIndicator)]) -> Vec<ComponentHealth> {
    let mut out = Vec::with_capacity(indicators.len());
    for indicator in indicators {
        let result = indicator.check_health().await;
        out.push(ComponentHealth {
            name: indicator.component_name().to_string(),
            healthy: result.is_ok(),
            message: result.err().map(|e| e.to_string()),
        });
    }
    out
}
