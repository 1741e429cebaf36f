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

use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use imagevault_error::make_input_err;
use imagevault_util::ImageId;

use crate::dto::{ImageRecordResponse, UploadResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /images`: multipart with a `file` field and an optional
/// `resolutions` field, comma-separated per `spec.md` §6.
pub async fn upload_image(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut resolutions: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| make_input_err!("malformed multipart body: {e}"))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                filename = Some(field.file_name().unwrap_or("upload").to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| make_input_err!("failed to read file field: {e}"))?;
                bytes = Some(data.to_vec());
            }
            "resolutions" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| make_input_err!("failed to read resolutions field: {e}"))?;
                resolutions.extend(text.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string));
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| make_input_err!("multipart body must include a 'file' field"))?;
    let bytes = bytes.ok_or_else(|| make_input_err!("multipart body must include a 'file' field"))?;
    let size = bytes.len() as u64;

    let cancel = state.shutdown.child_token();
    let outcome = state.service.upload(&filename, bytes, size, &resolutions, &cancel).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse::from(outcome))).into_response())
}

pub async fn get_metadata(State(state): State<AppState>, Path(id): Path<ImageId>) -> Result<Json<ImageRecordResponse>, ApiError> {
    let record = state.service.get_metadata(id).await?;
    Ok(Json(ImageRecordResponse::from(record)))
}

/// `GET /images/{id}/{label}`: always a 302 to a presigned URL rather
/// than streaming bytes through this process, consulting (and
/// populating) the URL cache first — `spec.md` §4.6's read-path cache
/// contract, resolved in `DESIGN.md`.
pub async fn get_resolution(State(state): State<AppState>, Path((id, label)): Path<(ImageId, String)>) -> Result<Response, ApiError> {
    if let Some(cached) = state.meta.url_cache_get(id, &label).await? {
        return Ok(Redirect::to(&cached).into_response());
    }

    let key = state.service.resolve_key(id, &label).await?;
    let cancel = state.shutdown.child_token();
    let expiry_seconds = state
        .config
        .store
        .as_ref()
        .map(|s| s.presign_expiry_seconds)
        .unwrap_or(3600);
    let url = state.service.presign(&key, Duration::from_secs(expiry_seconds), &cancel).await?;

    let ttl = Duration::from_secs((expiry_seconds / 2).max(1));
    if let Err(e) = state.meta.url_cache_put(id, &label, &url, ttl).await {
        tracing::warn!(error = %e, image_id = %id, label = %label, "failed to populate presigned URL cache");
    }

    Ok(Redirect::to(&url).into_response())
}

pub async fn materialize_resolution(State(state): State<AppState>, Path((id, label)): Path<(ImageId, String)>) -> Result<StatusCode, ApiError> {
    let cancel = state.shutdown.child_token();
    state.service.ensure_resolution(id, &label, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_image(State(state): State<AppState>, Path(id): Path<ImageId>) -> Result<StatusCode, ApiError> {
    let cancel = state.shutdown.child_token();
    state.service.delete_image(id, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_resolution(State(state): State<AppState>, Path((id, label)): Path<(ImageId, String)>) -> Result<StatusCode, ApiError> {
    let cancel = state.shutdown.child_token();
    state.service.delete_resolution(id, &label, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}
