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

pub mod health;
pub mod images;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use imagevault_config::cors::CorsConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{auth, metrics, rate_limit};

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }
    let layer = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);
    let layer = if config.allow_all_origins {
        layer.allow_origin(AllowOrigin::any())
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    };
    if config.allow_credentials {
        layer.allow_credentials(true)
    } else {
        layer
    }
}

/// Builds the full `axum::Router`, layering auth and rate limiting
/// per-category so each endpoint group gets the correct budget and
/// write/read key requirement, per `spec.md` §6.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors);

    let upload_routes = Router::new()
        .route("/images", post(images::upload_image))
        .route("/images/:id/resolutions/:label", post(images::materialize_resolution))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce_upload))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_write));

    let mutate_routes = Router::new()
        .route("/images/:id", delete(images::delete_image))
        .route("/images/:id/resolutions/:label", delete(images::delete_resolution))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce_info))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_write));

    let metadata_routes = Router::new()
        .route("/images/:id", get(images::get_metadata))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce_info))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_read));

    let download_routes = Router::new()
        .route("/images/:id/:label", get(images::get_resolution))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce_download))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_read));

    Router::new()
        .merge(upload_routes)
        .merge(mutate_routes)
        .merge(metadata_routes)
        .merge(download_routes)
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(state.clone(), metrics::count_request))
        .with_state(state)
}
