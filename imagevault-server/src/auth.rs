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

//! Coarse API-key check, grounded in `check_api_key` in
//! `other_examples/.../mensatt-image-service__src-handlers-image.rs.rs`:
//! a header is compared against configured key lists and the request
//! either proceeds or is rejected outright, with no `Code` variant
//! involved (401 has no equivalent in `imagevault_error::Code`).

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::state::AppState;

fn api_key<'h>(headers: &'h HeaderMap, header_name: &str) -> &'h str {
    headers.get(header_name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "missing or invalid API key"}))).into_response()
}

fn authorized(state: &AppState, headers: &HeaderMap, need_write: bool) -> bool {
    let auth = &state.config.auth;
    if !auth.enabled {
        return true;
    }
    let key = api_key(headers, auth.key_header_name.as_str());
    let can_write = auth.read_write_keys.iter().any(|k| k == key);
    if need_write {
        can_write
    } else {
        can_write || auth.read_only_keys.iter().any(|k| k == key)
    }
}

pub async fn require_write(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if authorized(&state, req.headers(), true) {
        next.run(req).await
    } else {
        unauthorized()
    }
}

pub async fn require_read(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if authorized(&state, req.headers(), false) {
        next.run(req).await
    } else {
        unauthorized()
    }
}
