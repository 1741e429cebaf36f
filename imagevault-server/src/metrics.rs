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

//! `GET /metrics`: a `prometheus-client` registry populated on each
//! scrape from `ImageService::stats()`, already a `nativelink-service`
//! dev-dependency promoted to a real one here per `SPEC_FULL.md` §6.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use imagevault_service::ServiceStatistics;

use crate::state::AppState;

pub struct AppMetrics {
    registry: Registry,
    http_requests_total: Counter,
    image_count: Gauge,
    dedup_record_count: Gauge,
    estimated_stored_bytes: Gauge,
    url_cache_hits: Gauge,
    url_cache_misses: Gauge,
}

impl AppMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let http_requests_total = Counter::default();
        let image_count = Gauge::default();
        let dedup_record_count = Gauge::default();
        let estimated_stored_bytes = Gauge::default();
        let url_cache_hits = Gauge::default();
        let url_cache_misses = Gauge::default();

        registry.register("http_requests", "Total HTTP requests handled", http_requests_total.clone());
        registry.register("images", "Number of distinct images stored", image_count.clone());
        registry.register("dedup_records", "Number of distinct content fingerprints", dedup_record_count.clone());
        registry.register(
            "estimated_stored_bytes",
            "Estimated object-store bytes in use, including derived variants",
            estimated_stored_bytes.clone(),
        );
        registry.register("url_cache_hits", "Presigned URL cache hits", url_cache_hits.clone());
        registry.register("url_cache_misses", "Presigned URL cache misses", url_cache_misses.clone());

        AppMetrics {
            registry,
            http_requests_total,
            image_count,
            dedup_record_count,
            estimated_stored_bytes,
            url_cache_hits,
            url_cache_misses,
        }
    }

    pub fn record_request(&self) {
        self.http_requests_total.inc();
    }

    fn apply(&self, stats: &ServiceStatistics) {
        self.image_count.set(stats.image_count as i64);
        self.dedup_record_count.set(stats.dedup_record_count as i64);
        self.estimated_stored_bytes.set(stats.estimated_stored_bytes as i64);
        self.url_cache_hits.set(stats.url_cache_hits as i64);
        self.url_cache_misses.set(stats.url_cache_misses as i64);
    }

    pub fn encode(&self, stats: &ServiceStatistics) -> String {
        self.apply(stats);
        let mut buf = String::new();
        encode(&mut buf, &self.registry).expect("prometheus text encoding is infallible for our metric types");
        buf
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts every request that reaches the router, including `/health` and
/// `/metrics` themselves, towards `http_requests_total`.
pub async fn count_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    state.metrics.record_request();
    next.run(req).await
}
