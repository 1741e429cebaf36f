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

//! Drives the full `axum::Router` with `tower::ServiceExt::oneshot`,
//! the way the teacher drives its own gRPC services in-process for
//! integration tests, over an embedded `fjall` KV store and the
//! in-memory `ObjectStore` fake so nothing here touches a real backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use imagevault_config::Config;
use imagevault_kv::embedded::EmbeddedKvStore;
use imagevault_meta::MetadataRepository;
use imagevault_server::metrics::AppMetrics;
use imagevault_server::rate_limit::RateLimiters;
use imagevault_server::{build_router, AppState};
use imagevault_service::ImageService;
use imagevault_store::{MemoryObjectStore, ObjectStore};
use tower::ServiceExt;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(width, height, image::Rgba([5, 5, 5, 255])));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn multipart_body(boundary: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn new_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let kv = EmbeddedKvStore::open(dir.path().to_str().unwrap()).unwrap();
    let meta = Arc::new(MetadataRepository::new(Arc::new(kv)));
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
    let config = Arc::new(Config::default());
    let service = Arc::new(ImageService::new(store, meta.clone(), config.image.clone()));
    let state = AppState {
        service,
        meta,
        limiters: Arc::new(RateLimiters::new(&config.rate_limit)),
        metrics: Arc::new(AppMetrics::new()),
        config,
        shutdown: tokio_util::sync::CancellationToken::new(),
    };
    (dir, state)
}

#[tokio::test]
async fn upload_then_fetch_metadata_round_trips() {
    let (_dir, state) = new_state().await;
    let app = build_router(state);

    let boundary = "X-BOUNDARY-1";
    let body = multipart_body(boundary, "cat.png", &png_bytes(64, 64));
    let request = Request::builder()
        .method("POST")
        .uri("/images")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let id = parsed["id"].as_str().unwrap().to_string();

    let request = Request::builder().method("GET").uri(format!("/images/{id}")).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let record: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(record["mime_type"], "png");
    assert_eq!(record["resolutions"], serde_json::json!(["thumbnail"]));
}

#[tokio::test]
async fn get_unmaterialized_resolution_is_not_found() {
    let (_dir, state) = new_state().await;
    let app = build_router(state);

    let boundary = "X-BOUNDARY-2";
    let body = multipart_body(boundary, "cat.png", &png_bytes(64, 64));
    let request = Request::builder()
        .method("POST")
        .uri("/images")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let id = serde_json::from_slice::<serde_json::Value>(&bytes).unwrap()["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/images/{id}/400x400"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_image_then_metadata_lookup_fails() {
    let (_dir, state) = new_state().await;
    let app = build_router(state);

    let boundary = "X-BOUNDARY-3";
    let body = multipart_body(boundary, "cat.png", &png_bytes(32, 32));
    let request = Request::builder()
        .method("POST")
        .uri("/images")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let id = serde_json::from_slice::<serde_json::Value>(&bytes).unwrap()["id"].as_str().unwrap().to_string();

    let request = Request::builder().method("DELETE").uri(format!("/images/{id}")).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let request = Request::builder().method("GET").uri(format!("/images/{id}")).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_metrics_endpoints_respond() {
    let (_dir, state) = new_state().await;
    let app = build_router(state);

    let request = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_enabled_rejects_missing_api_key() {
    let (_dir, mut state) = new_state().await;
    let mut config = (*state.config).clone();
    config.auth.enabled = true;
    config.auth.read_write_keys = vec!["secret".to_string()];
    state.config = Arc::new(config);
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/images")
        .header("content-type", "multipart/form-data; boundary=X")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
