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

//! Per-key token-bucket rate limiting via `governor`. Not grounded in the
//! retrieval pack (recorded as an ecosystem import in `DESIGN.md`); keyed
//! by API key when auth is enabled, or a single shared "anonymous" bucket
//! otherwise.

use std::num::NonZeroU32;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use imagevault_config::rate_limit::RateLimitConfig;
use serde_json::json;

use crate::state::AppState;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

fn quota_per_minute(n: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(n.max(1)).unwrap())
}

/// One bucket per configured category, each keyed independently by
/// caller identity.
pub struct RateLimiters {
    upload: KeyedLimiter,
    download: KeyedLimiter,
    info: KeyedLimiter,
}

impl RateLimiters {
    pub fn new(config: &RateLimitConfig) -> Self {
        RateLimiters {
            upload: RateLimiter::keyed(quota_per_minute(config.upload_per_minute)),
            download: RateLimiter::keyed(quota_per_minute(config.download_per_minute)),
            info: RateLimiter::keyed(quota_per_minute(config.info_per_minute)),
        }
    }
}

fn caller_key(state: &AppState, headers: &HeaderMap) -> String {
    let auth = &state.config.auth;
    if !auth.enabled {
        return "anonymous".to_string();
    }
    headers
        .get(auth.key_header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

fn rate_limited() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "rate limit exceeded"}))).into_response()
}

pub async fn enforce_upload(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = caller_key(&state, req.headers());
    if state.limiters.upload.check_key(&key).is_ok() {
        next.run(req).await
    } else {
        rate_limited()
    }
}

pub async fn enforce_download(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = caller_key(&state, req.headers());
    if state.limiters.download.check_key(&key).is_ok() {
        next.run(req).await
    } else {
        rate_limited()
    }
}

pub async fn enforce_info(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = caller_key(&state, req.headers());
    if state.limiters.info.check_key(&key).is_ok() {
        next.run(req).await
    } else {
        rate_limited()
    }
}
