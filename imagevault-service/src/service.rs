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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use imagevault_codec::{self as codec, ResizeConfig};
use imagevault_config::image::{ImageConfig, ResizeMode as ConfigResizeMode};
use imagevault_dedup::{keys as dedup_keys, DeduplicationEngine, DetectionOutcome};
use imagevault_error::{make_err, make_input_err, Code, Error, ResultExt};
use imagevault_meta::{ImageRecord, MetadataRepository, RepositoryStatistics};
use imagevault_store::{ByteStream, FileMetadata, ObjectStore};
use imagevault_util::fingerprint::ImageFingerprint;
use imagevault_util::resolution::{has_resolution, ResolutionLabel};
use imagevault_util::ImageId;
use tokio_util::sync::CancellationToken;

use crate::mime;

/// Result of a successful `ImageService::upload`. `sizes` carries the
/// pixel dimensions of every label that was actually materialized, keyed
/// by canonical label string.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub id: ImageId,
    pub materialized_labels: Vec<ResolutionLabel>,
    pub sizes: HashMap<String, (u32, u32)>,
}

/// Aggregate counters exposed via `GET /metrics`. `estimated_stored_bytes`
/// is not authoritative: derived-variant byte sizes are not tracked, and
/// are estimated at 70% of the owning image's original size (see
/// `DESIGN.md`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ServiceStatistics {
    pub image_count: u64,
    pub dedup_record_count: u64,
    pub estimated_stored_bytes: u64,
    pub url_cache_hits: u64,
    pub url_cache_misses: u64,
}

fn resize_mode_from_config(mode: ConfigResizeMode) -> codec::ResizeMode {
    match mode {
        ConfigResizeMode::smart_fit => codec::ResizeMode::SmartFit,
        ConfigResizeMode::crop => codec::ResizeMode::Crop,
        ConfigResizeMode::stretch => codec::ResizeMode::Stretch,
    }
}

/// Image Service (C6): the orchestration layer owning the upload, variant
/// materialization, retrieval, and deletion contracts of `spec.md` §4.6.
/// Composes the Object Store Adapter, Metadata Repository, and
/// Deduplication Engine exactly as the teacher's scheduler composes its
/// own worker pool and stores behind `Arc`-shared handles.
pub struct ImageService {
    store: Arc<dyn ObjectStore>,
    meta: Arc<MetadataRepository>,
    dedup: DeduplicationEngine,
    image_config: ImageConfig,
    overall_health_refresh: Duration,
    overall_health_cache: tokio::sync::RwLock<Option<(std::time::Instant, Result<(), String>)>>,
}

impl ImageService {
    pub fn new(store: Arc<dyn ObjectStore>, meta: Arc<MetadataRepository>, image_config: ImageConfig) -> Self {
        Self::with_health_config(store, meta, image_config, &imagevault_config::health::HealthConfig::default())
    }

    /// Like `new`, but honors `health_config.overall_check_interval_seconds`
    /// for the `GET /health` aggregate cache (the KV ping plus the
    /// already-cached object-store probe), per `spec.md` §5/§9.
    pub fn with_health_config(
        store: Arc<dyn ObjectStore>,
        meta: Arc<MetadataRepository>,
        image_config: ImageConfig,
        health_config: &imagevault_config::health::HealthConfig,
    ) -> Self {
        let dedup = DeduplicationEngine::new(store.clone(), meta.clone());
        ImageService {
            store,
            meta,
            dedup,
            image_config,
            overall_health_refresh: Duration::from_secs(health_config.effective_overall_check_interval_seconds()),
            overall_health_cache: tokio::sync::RwLock::new(None),
        }
    }

    /// `spec.md` §4.6 upload contract.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        size: u64,
        requested_labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, Error> {
        if filename.is_empty() {
            return Err(make_input_err!("filename must not be empty"));
        }
        if size != bytes.len() as u64 {
            return Err(make_input_err!(
                "declared size {size} does not match {} received bytes",
                bytes.len()
            ));
        }
        if bytes.is_empty() {
            return Err(make_input_err!("uploaded bytes must not be empty"));
        }

        let mut requested = Vec::with_capacity(requested_labels.len());
        for raw in requested_labels {
            let label = ResolutionLabel::parse(raw)?;
            label.check_within(self.image_config.effective_max_width(), self.image_config.effective_max_height())?;
            requested.push(label);
        }

        codec::validate(&bytes, self.image_config.max_file_bytes)?;
        let detected_mime = codec::detect_mime(&bytes)?;
        let (width, height) = codec::dimensions(&bytes)?;
        let mime_short = mime::short_name(detected_mime);
        let ext = mime::extension_for_short_name(mime_short)?;
        let content_type = mime::content_type_for_short_name(mime_short);

        let fingerprint = ImageFingerprint::compute(&bytes);
        let outcome = self.dedup.detect(&bytes, &fingerprint, cancel).await?;

        let new_id = ImageId::new_v4();
        let (is_deduped, shared_image_id) = match outcome {
            DetectionOutcome::Unique => {
                self.dedup
                    .register_first_writer(new_id, fingerprint.clone(), ext, &bytes, content_type, cancel)
                    .await?;
                (false, None)
            }
            DetectionOutcome::Duplicate { master_image_id } => {
                let master = self
                    .dedup
                    .register_subsequent_reference(new_id, &fingerprint, &bytes, content_type, cancel)
                    .await?;
                debug_assert_eq!(master, master_image_id);
                (true, Some(master))
            }
        };

        // {"thumbnail"} ∪ requested when enabled, else exactly requested.
        // "original" is always implicit and never materialized here;
        // duplicates are collapsed by `seen`.
        let mut label_set = Vec::new();
        let mut seen = HashSet::new();
        if self.image_config.generate_default_resolutions {
            seen.insert(ResolutionLabel::Thumbnail);
            label_set.push(ResolutionLabel::Thumbnail);
        }
        for label in requested {
            if label.is_original() {
                continue;
            }
            if seen.insert(label) {
                label_set.push(label);
            }
        }

        let mut materialized = Vec::new();
        let mut sizes = HashMap::new();
        for label in label_set {
            let (target_w, target_h) = match label {
                ResolutionLabel::Thumbnail => (self.image_config.thumbnail_width, self.image_config.thumbnail_height),
                ResolutionLabel::Dimensions(w, h) => (w, h),
                ResolutionLabel::Original => continue,
            };
            let resize_config = ResizeConfig {
                width: target_w,
                height: target_h,
                quality: self.image_config.quality,
                format: detected_mime,
                mode: resize_mode_from_config(self.image_config.resize_mode),
                background: self.image_config.background.clone(),
            };
            let result = self
                .dedup
                .materialize_resolution(
                    &fingerprint,
                    new_id,
                    label,
                    ext,
                    content_type,
                    move |original_bytes| codec::resize(original_bytes, &resize_config),
                    cancel,
                )
                .await;
            match result {
                Ok(_) => {
                    materialized.push(label);
                    sizes.insert(label.canonical(), (target_w, target_h));
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        label = %label,
                        image_id = %new_id,
                        "failed to materialize resolution during upload; omitting from result"
                    );
                }
            }
        }

        let now = chrono::Utc::now();
        let record = ImageRecord {
            id: new_id,
            original_filename: filename.to_string(),
            mime_type: mime_short.to_string(),
            byte_size: size,
            width,
            height,
            resolutions: materialized.clone(),
            created_at: now,
            updated_at: now,
            fingerprint,
            is_deduped,
            shared_image_id,
        };

        if let Err(e) = self.meta.store_image(&record).await {
            tracing::warn!(
                error = %e,
                image_id = %new_id,
                "metadata store failed after upload; cleaning up freshly uploaded objects"
            );
            // Variants always live under the master's prefix; only a
            // first-writer upload owns a prefix of its own to reclaim.
            if !is_deduped {
                if let Err(cleanup_err) = self.store.delete_prefix(&dedup_keys::object_prefix(new_id), cancel).await {
                    tracing::warn!(
                        error = %cleanup_err,
                        image_id = %new_id,
                        "best-effort cleanup after failed metadata store also failed"
                    );
                }
            }
            return Err(e);
        }

        Ok(UploadOutcome {
            id: new_id,
            materialized_labels: materialized,
            sizes,
        })
    }

    pub async fn get_metadata(&self, id: ImageId) -> Result<ImageRecord, Error> {
        self.meta
            .get_image(id)
            .await?
            .err_tip_with_code(|_| (Code::NotFound, format!("Image {id} not found")))
    }

    /// Resolves a materialized label to its storage key without touching
    /// the object store, for callers (the presigned-redirect read path)
    /// that need the key but not the bytes.
    pub async fn resolve_key(&self, id: ImageId, label: &str) -> Result<String, Error> {
        let record = self.get_metadata(id).await?;
        let parsed = ResolutionLabel::parse(label)?;
        if !has_resolution(&record.resolutions, &parsed) {
            return Err(make_err!(Code::NotFound, "Resolution '{label}' not materialized for image {id}"));
        }
        let ext = mime::extension_for_short_name(&record.mime_type)?;
        Ok(DeduplicationEngine::resolve_storage_key(&record, &parsed, ext))
    }

    /// `spec.md` §4.5.6 read path: resolves a label to a storage key
    /// without ever taking the caller's own id, then streams it back.
    pub async fn get_stream(&self, id: ImageId, label: &str, cancel: &CancellationToken) -> Result<(ByteStream, FileMetadata), Error> {
        let key = self.resolve_key(id, label).await?;
        let stream = self.store.download(&key, cancel).await?;
        let metadata = self.store.head(&key, cancel).await?;
        Ok((stream, metadata))
    }

    pub fn meta(&self) -> &Arc<MetadataRepository> {
        &self.meta
    }

    /// Materializes `label` for `id` if not already present, recording it
    /// on the ImageRecord. A no-op if the label is already materialized.
    pub async fn ensure_resolution(&self, id: ImageId, label: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let record = self.get_metadata(id).await?;
        let parsed = ResolutionLabel::parse(label)?;
        parsed.check_within(self.image_config.effective_max_width(), self.image_config.effective_max_height())?;
        if has_resolution(&record.resolutions, &parsed) {
            return Ok(());
        }

        let (target_w, target_h) = match parsed {
            ResolutionLabel::Thumbnail => (self.image_config.thumbnail_width, self.image_config.thumbnail_height),
            ResolutionLabel::Dimensions(w, h) => (w, h),
            ResolutionLabel::Original => return Ok(()),
        };
        let ext = mime::extension_for_short_name(&record.mime_type)?;
        let content_type = mime::content_type_for_short_name(&record.mime_type);
        let codec_mime = mime::codec_mime_for_short_name(&record.mime_type)?;
        let resize_config = ResizeConfig {
            width: target_w,
            height: target_h,
            quality: self.image_config.quality,
            format: codec_mime,
            mode: resize_mode_from_config(self.image_config.resize_mode),
            background: self.image_config.background.clone(),
        };

        self.dedup
            .materialize_resolution(
                &record.fingerprint,
                record.id,
                parsed,
                ext,
                content_type,
                move |bytes| codec::resize(bytes, &resize_config),
                cancel,
            )
            .await?;

        let mut resolutions = record.resolutions;
        resolutions.push(parsed);
        self.meta.update_resolutions(id, resolutions).await
    }

    pub async fn delete_image(&self, id: ImageId, cancel: &CancellationToken) -> Result<(), Error> {
        let record = self.get_metadata(id).await?;
        let ext = mime::extension_for_short_name(&record.mime_type)?;
        self.dedup.remove_reference(&record, ext, cancel).await?;
        self.meta.delete_image(id).await
    }

    /// Refuses `"original"` per `spec.md` §4.6; otherwise follows §4.5.7
    /// restricted to the single label and updates `resolutions`.
    pub async fn delete_resolution(&self, id: ImageId, label: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let parsed = ResolutionLabel::parse(label)?;
        if parsed.is_original() {
            return Err(make_input_err!("cannot delete the 'original' resolution"));
        }
        let record = self.get_metadata(id).await?;
        if !has_resolution(&record.resolutions, &parsed) {
            return Ok(());
        }
        let ext = mime::extension_for_short_name(&record.mime_type)?;
        self.dedup.remove_single_resolution_reference(&record, &parsed, ext, cancel).await?;

        let remaining: Vec<ResolutionLabel> = record.resolutions.into_iter().filter(|l| *l != parsed).collect();
        self.meta.update_resolutions(id, remaining).await?;
        self.meta.url_cache_del(id, &parsed.canonical()).await
    }

    pub async fn list(&self, offset: usize, limit: usize) -> Result<Vec<ImageRecord>, Error> {
        self.meta.list(offset, limit).await
    }

    /// Consults the URL cache first; callers that get a hit should skip
    /// this entirely and call `MetadataRepository::url_cache_get`
    /// themselves, per `spec.md` §4.6 — this is the presign round-trip
    /// itself, invoked on a cache miss.
    pub async fn presign(&self, storage_key: &str, duration: Duration, cancel: &CancellationToken) -> Result<String, Error> {
        self.store.presign_get(storage_key, duration.as_secs(), cancel).await
    }

    /// Aggregates the KV ping and the object-store probe (itself already
    /// cached by `HealthCachedStore`), throttled to
    /// `overall_check_interval_seconds` so `GET /health` under load
    /// doesn't re-run even the cheap KV ping on every request.
    pub async fn health(&self, cancel: &CancellationToken) -> Result<(), Error> {
        {
            let cache = self.overall_health_cache.read().await;
            if let Some((checked_at, result)) = cache.as_ref() {
                if checked_at.elapsed() < self.overall_health_refresh {
                    return result.clone().map_err(|msg| make_err!(Code::Unavailable, "{msg}"));
                }
            }
        }
        let mut cache = self.overall_health_cache.write().await;
        if let Some((checked_at, result)) = cache.as_ref() {
            if checked_at.elapsed() < self.overall_health_refresh {
                return result.clone().map_err(|msg| make_err!(Code::Unavailable, "{msg}"));
            }
        }
        let result = async {
            self.meta.health().await?;
            self.store.health(cancel).await
        }
        .await;
        *cache = Some((std::time::Instant::now(), result.as_ref().map(|_| ()).map_err(|e| e.to_string())));
        result
    }

    /// `(added)` per `SPEC_FULL.md` §4.6: aggregate counters for
    /// `GET /metrics`. `estimated_stored_bytes` approximates derived
    /// variants at 70% of their owning image's original size since
    /// per-variant byte sizes are not tracked authoritatively.
    pub async fn stats(&self) -> Result<ServiceStatistics, Error> {
        let RepositoryStatistics {
            image_count,
            dedup_record_count,
            total_unique_bytes,
            url_cache_hits,
            url_cache_misses,
            ..
        } = self.meta.statistics().await?;

        let all_images = self.meta.list(0, usize::MAX).await?;
        let variant_estimate: u64 = all_images
            .iter()
            .map(|record| (record.resolutions.len() as u64) * (record.byte_size * 7 / 10))
            .sum();

        Ok(ServiceStatistics {
            image_count,
            dedup_record_count,
            estimated_stored_bytes: total_unique_bytes + variant_estimate,
            url_cache_hits,
            url_cache_misses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagevault_kv::embedded::EmbeddedKvStore;
    use imagevault_store::MemoryObjectStore;

    fn make_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([10, 20, 30, 255]),
        ));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    async fn new_fixture() -> (tempfile::TempDir, ImageService) {
        let dir = tempfile::tempdir().unwrap();
        let kv = EmbeddedKvStore::open(dir.path().to_str().unwrap()).unwrap();
        let meta = Arc::new(MetadataRepository::new(Arc::new(kv)));
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let service = ImageService::new(store, meta, ImageConfig::default());
        (dir, service)
    }

    #[tokio::test]
    async fn upload_materializes_thumbnail_by_default() {
        let (_dir, service) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = make_png(100, 50);
        let size = bytes.len() as u64;
        let outcome = service.upload("cat.png", bytes, size, &[], &cancel).await.unwrap();
        assert_eq!(outcome.materialized_labels, vec![ResolutionLabel::Thumbnail]);
        assert!(outcome.sizes.contains_key("thumbnail"));

        let record = service.get_metadata(outcome.id).await.unwrap();
        assert_eq!(record.mime_type, "png");
        assert!(!record.is_deduped);
    }

    #[tokio::test]
    async fn rejects_declared_size_mismatch() {
        let (_dir, service) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = make_png(10, 10);
        let err = service.upload("a.png", bytes, 999, &[], &cancel).await.unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn second_upload_of_identical_bytes_is_deduped() {
        let (_dir, service) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = make_png(20, 20);
        let size = bytes.len() as u64;
        let first = service.upload("a.png", bytes.clone(), size, &[], &cancel).await.unwrap();
        let second = service.upload("b.png", bytes, size, &[], &cancel).await.unwrap();

        let second_record = service.get_metadata(second.id).await.unwrap();
        assert!(second_record.is_deduped);
        assert_eq!(second_record.shared_image_id, Some(first.id));
    }

    #[tokio::test]
    async fn get_stream_returns_not_found_for_unmaterialized_label() {
        let (_dir, service) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = make_png(20, 20);
        let size = bytes.len() as u64;
        let outcome = service
            .upload("a.png", bytes, size, &[], &cancel)
            .await
            .unwrap();
        let err = service.get_stream(outcome.id, "400x400", &cancel).await.unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn ensure_resolution_then_get_stream_succeeds() {
        let (_dir, service) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = make_png(300, 300);
        let size = bytes.len() as u64;
        let outcome = service.upload("a.png", bytes, size, &[], &cancel).await.unwrap();
        service.ensure_resolution(outcome.id, "50x50", &cancel).await.unwrap();
        let (_stream, metadata) = service.get_stream(outcome.id, "50x50", &cancel).await.unwrap();
        assert!(metadata.size > 0);
    }

    #[tokio::test]
    async fn delete_resolution_refuses_original() {
        let (_dir, service) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = make_png(20, 20);
        let size = bytes.len() as u64;
        let outcome = service.upload("a.png", bytes, size, &[], &cancel).await.unwrap();
        let err = service.delete_resolution(outcome.id, "original", &cancel).await.unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn delete_image_removes_metadata() {
        let (_dir, service) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = make_png(20, 20);
        let size = bytes.len() as u64;
        let outcome = service.upload("a.png", bytes, size, &[], &cancel).await.unwrap();
        service.delete_image(outcome.id, &cancel).await.unwrap();
        let err = service.get_metadata(outcome.id).await.unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }
}
