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

use std::sync::Arc;

use imagevault_config::Config;
use imagevault_meta::MetadataRepository;
use imagevault_service::ImageService;
use tokio_util::sync::CancellationToken;

use crate::metrics::AppMetrics;
use crate::rate_limit::RateLimiters;

/// Shared handles every handler needs, cloned cheaply (everything behind
/// an `Arc`) the way the teacher's gRPC services share a store manager
/// across request-handling tasks.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImageService>,
    pub meta: Arc<MetadataRepository>,
    pub config: Arc<Config>,
    pub limiters: Arc<RateLimiters>,
    pub metrics: Arc<AppMetrics>,
    /// Root of the process shutdown token. Handlers derive a
    /// `child_token()` so `cancel.cancel()` on shutdown reaches every
    /// in-flight C1/C2 call without the root itself ever being cancelled
    /// by a single request.
    pub shutdown: CancellationToken,
}
