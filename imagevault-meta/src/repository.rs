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
use std::time::Duration;

use bytes::Bytes;
use imagevault_error::{make_err, Code, Error, ResultExt};
use imagevault_kv::{collect_scan, KvStore};
use imagevault_util::fingerprint::ImageFingerprint;
use imagevault_util::metrics::HitMissCounters;
use imagevault_util::resolution::ResolutionLabel;
use imagevault_util::ImageId;

use crate::keys;
use crate::records::{DeduplicationRecord, ImageRecord};

/// Aggregate counts computed by full prefix scans, per `spec.md` §4.3.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RepositoryStatistics {
    pub image_count: u64,
    pub total_logical_bytes: u64,
    pub dedup_record_count: u64,
    pub total_unique_bytes: u64,
    pub url_cache_hits: u64,
    pub url_cache_misses: u64,
}

/// Typed layer over the KV Backend (C3): image records, deduplication
/// records, the presigned-URL cache, and statistics aggregation. Tracing
/// follows the teacher's convention of logging at the boundary of every
/// backend call that can fail.
pub struct MetadataRepository {
    kv: Arc<dyn KvStore>,
    url_cache_counters: HitMissCounters,
}

impl MetadataRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        MetadataRepository {
            kv,
            url_cache_counters: HitMissCounters::new(),
        }
    }

    pub async fn store_image(&self, record: &ImageRecord) -> Result<(), Error> {
        record.validate().err_tip(|| "store_image: record failed validation")?;
        let fields = record.to_field_map();
        self.kv
            .put_fields(&keys::metadata_key(record.id), &fields, None)
            .await
            .err_tip(|| format!("store_image: failed to persist {}", record.id))
    }

    pub async fn get_image(&self, id: ImageId) -> Result<Option<ImageRecord>, Error> {
        match self.kv.get_fields(&keys::metadata_key(id)).await? {
            Some(fields) => Ok(Some(ImageRecord::from_field_map(&fields)?)),
            None => Ok(None),
        }
    }

    /// Read-then-write; not transactional across concurrent readers. A
    /// TOCTOU race is acceptable per `spec.md` §4.3 provided the
    /// subsequent write of an invalid record is refused by `validate`.
    pub async fn update_image(&self, record: &ImageRecord) -> Result<(), Error> {
        self.get_image(record.id)
            .await?
            .err_tip_with_code(|_| (Code::NotFound, format!("Image {} not found", record.id)))?;
        self.store_image(record).await
    }

    pub async fn delete_image(&self, id: ImageId) -> Result<(), Error> {
        self.kv
            .delete(&keys::metadata_key(id))
            .await
            .err_tip(|| format!("delete_image: failed to delete {id}"))?;
        self.url_cache_del_all_for_image(id).await
    }

    pub async fn exists(&self, id: ImageId) -> Result<bool, Error> {
        Ok(self.get_image(id).await?.is_some())
    }

    /// Lists records in a deterministic order (sorted by KV key) so
    /// repeated calls with the same `offset`/`limit` paginate stably.
    pub async fn list(&self, offset: usize, limit: usize) -> Result<Vec<ImageRecord>, Error> {
        let mut entries = collect_scan(self.kv.as_ref(), keys::METADATA_PREFIX).await?;
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let mut out = Vec::new();
        for entry in entries.into_iter().skip(offset).take(limit) {
            if let Some(fields) = self.kv.get_fields(&entry.key).await? {
                out.push(ImageRecord::from_field_map(&fields)?);
            }
        }
        Ok(out)
    }

    /// Replaces the `resolutions` set of an existing image and bumps
    /// `updated_at`.
    pub async fn update_resolutions(&self, id: ImageId, labels: Vec<ResolutionLabel>) -> Result<(), Error> {
        let mut record = self
            .get_image(id)
            .await?
            .err_tip_with_code(|_| (Code::NotFound, format!("Image {id} not found")))?;
        record.resolutions = labels;
        record.updated_at = chrono::Utc::now();
        self.store_image(&record).await
    }

    pub async fn store_dedup(&self, record: &DeduplicationRecord) -> Result<(), Error> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| make_err!(Code::Internal, "Failed to encode dedup record: {e}"))?;
        self.kv
            .put(&keys::dedup_key(&record.fingerprint.storage_key()), Bytes::from(bytes), None)
            .await
    }

    /// Loads the DeduplicationRecord for `fingerprint`, setting
    /// `needs_rebuild` if the stored JSON predates `resolution_refs`
    /// (per the legacy-rebuild protocol of `spec.md` §4.5.8).
    pub async fn get_dedup(&self, fingerprint: &ImageFingerprint) -> Result<Option<DeduplicationRecord>, Error> {
        let key = keys::dedup_key(&fingerprint.storage_key());
        let Some(bytes) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| make_err!(Code::Internal, "Corrupt dedup record at {key}: {e}"))?;
        let needs_rebuild = value.get("resolution_refs").is_none();
        let mut record: DeduplicationRecord = serde_json::from_value(value)
            .map_err(|e| make_err!(Code::Internal, "Corrupt dedup record at {key}: {e}"))?;
        record.needs_rebuild = needs_rebuild;
        Ok(Some(record))
    }

    /// `find_by_fingerprint` is the Stage 1 lookup of `spec.md` §4.5.2 —
    /// an alias of `get_dedup` kept as its own name to match the
    /// vocabulary the Deduplication Engine calls it by.
    pub async fn find_by_fingerprint(&self, fingerprint: &ImageFingerprint) -> Result<Option<DeduplicationRecord>, Error> {
        self.get_dedup(fingerprint).await
    }

    pub async fn update_dedup(&self, record: &mut DeduplicationRecord) -> Result<(), Error> {
        record.touch();
        self.store_dedup(record).await
    }

    pub async fn delete_dedup(&self, fingerprint: &ImageFingerprint) -> Result<(), Error> {
        self.kv.delete(&keys::dedup_key(&fingerprint.storage_key())).await
    }

    pub async fn add_hash_ref(&self, fingerprint: &ImageFingerprint, id: ImageId) -> Result<(), Error> {
        let mut record = self
            .get_dedup(fingerprint)
            .await?
            .err_tip_with_code(|_| (Code::NotFound, "Dedup record not found".to_string()))?;
        record.referencing_ids.insert(id);
        record
            .resolution_refs
            .entry("original".to_string())
            .or_default()
            .insert(id);
        self.update_dedup(&mut record).await
    }

    pub async fn remove_hash_ref(&self, fingerprint: &ImageFingerprint, id: ImageId) -> Result<(), Error> {
        let mut record = self
            .get_dedup(fingerprint)
            .await?
            .err_tip_with_code(|_| (Code::NotFound, "Dedup record not found".to_string()))?;
        record.referencing_ids.remove(&id);
        for refs in record.resolution_refs.values_mut() {
            refs.remove(&id);
        }
        self.update_dedup(&mut record).await
    }

    /// Defensive sweep for `DeduplicationRecord`s whose reference set has
    /// already emptied out but were not cleaned up synchronously (e.g. a
    /// crash between steps 2 and 5 of `spec.md` §4.5.7).
    pub async fn get_orphaned_fingerprints(&self) -> Result<Vec<ImageFingerprint>, Error> {
        let entries = collect_scan(self.kv.as_ref(), keys::DEDUP_PREFIX).await?;
        let mut out = Vec::new();
        for entry in entries {
            let record: DeduplicationRecord = serde_json::from_slice(&entry.value)
                .map_err(|e| make_err!(Code::Internal, "Corrupt dedup record at {}: {e}", entry.key))?;
            if record.is_orphaned() {
                out.push(record.fingerprint);
            }
        }
        Ok(out)
    }

    pub async fn url_cache_get(&self, id: ImageId, label: &str) -> Result<Option<String>, Error> {
        let value = self.kv.get(&keys::cache_key(id, label)).await?;
        match &value {
            Some(_) => self.url_cache_counters.record_hit(),
            None => self.url_cache_counters.record_miss(),
        }
        Ok(value.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    pub async fn url_cache_put(&self, id: ImageId, label: &str, url: &str, ttl: Duration) -> Result<(), Error> {
        self.kv
            .put(&keys::cache_key(id, label), Bytes::from(url.to_string()), Some(ttl))
            .await
    }

    pub async fn url_cache_del(&self, id: ImageId, label: &str) -> Result<(), Error> {
        self.kv.delete(&keys::cache_key(id, label)).await
    }

    pub async fn url_cache_del_all_for_image(&self, id: ImageId) -> Result<(), Error> {
        let entries = collect_scan(self.kv.as_ref(), &keys::cache_prefix_for_image(id)).await?;
        for entry in entries {
            self.kv.delete(&entry.key).await?;
        }
        Ok(())
    }

    pub async fn statistics(&self) -> Result<RepositoryStatistics, Error> {
        let mut stats = RepositoryStatistics {
            url_cache_hits: self.url_cache_counters.hits(),
            url_cache_misses: self.url_cache_counters.misses(),
            ..Default::default()
        };
        let image_entries = collect_scan(self.kv.as_ref(), keys::METADATA_PREFIX).await?;
        for entry in &image_entries {
            if let Some(fields) = self.kv.get_fields(&entry.key).await? {
                if let Ok(record) = ImageRecord::from_field_map(&fields) {
                    stats.image_count += 1;
                    stats.total_logical_bytes += record.byte_size;
                }
            }
        }
        let dedup_entries = collect_scan(self.kv.as_ref(), keys::DEDUP_PREFIX).await?;
        for entry in &dedup_entries {
            if let Ok(record) = serde_json::from_slice::<DeduplicationRecord>(&entry.value) {
                stats.dedup_record_count += 1;
                stats.total_unique_bytes += record.fingerprint.byte_size;
            }
        }
        Ok(stats)
    }

    pub async fn health(&self) -> Result<(), Error> {
        self.kv.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagevault_kv::embedded::EmbeddedKvStore;
    use imagevault_util::resolution::ResolutionLabel;

    fn new_repo() -> (tempfile::TempDir, MetadataRepository) {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddedKvStore::open(dir.path().to_str().unwrap()).unwrap();
        (dir, MetadataRepository::new(Arc::new(store)))
    }

    fn sample_image() -> ImageRecord {
        let now = chrono::Utc::now();
        ImageRecord {
            id: ImageId::new_v4(),
            original_filename: "cat.png".to_string(),
            mime_type: "png".to_string(),
            byte_size: 42,
            width: 10,
            height: 10,
            resolutions: vec![],
            created_at: now,
            updated_at: now,
            fingerprint: ImageFingerprint::compute(b"cat-bytes"),
            is_deduped: false,
            shared_image_id: None,
        }
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let (_dir, repo) = new_repo();
        let record = sample_image();
        repo.store_image(&record).await.unwrap();
        let fetched = repo.get_image(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.original_filename, "cat.png");
    }

    #[tokio::test]
    async fn update_image_requires_existing_record() {
        let (_dir, repo) = new_repo();
        let record = sample_image();
        let err = repo.update_image(&record).await.unwrap_err();
        assert_eq!(err.code, Code::NotFound);
    }

    #[tokio::test]
    async fn delete_image_clears_url_cache() {
        let (_dir, repo) = new_repo();
        let record = sample_image();
        repo.store_image(&record).await.unwrap();
        repo.url_cache_put(record.id, "original", "https://example/x", Duration::from_secs(60))
            .await
            .unwrap();
        repo.delete_image(record.id).await.unwrap();
        assert!(repo.get_image(record.id).await.unwrap().is_none());
        assert!(repo.url_cache_get(record.id, "original").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_resolutions_bumps_updated_at() {
        let (_dir, repo) = new_repo();
        let record = sample_image();
        repo.store_image(&record).await.unwrap();
        repo.update_resolutions(record.id, vec![ResolutionLabel::Thumbnail])
            .await
            .unwrap();
        let updated = repo.get_image(record.id).await.unwrap().unwrap();
        assert_eq!(updated.resolutions, vec![ResolutionLabel::Thumbnail]);
        assert!(updated.updated_at >= record.updated_at);
    }

    #[tokio::test]
    async fn dedup_round_trip_and_orphan_detection() {
        let (_dir, repo) = new_repo();
        let fingerprint = ImageFingerprint::compute(b"shared-bytes");
        let master = ImageId::new_v4();
        let record = DeduplicationRecord::new(fingerprint.clone(), master, "images/m/original.png".to_string());
        repo.store_dedup(&record).await.unwrap();

        let fetched = repo.get_dedup(&fingerprint).await.unwrap().unwrap();
        assert!(!fetched.needs_rebuild);
        assert!(!fetched.is_orphaned());

        repo.remove_hash_ref(&fingerprint, master).await.unwrap();
        let orphaned = repo.get_orphaned_fingerprints().await.unwrap();
        assert_eq!(orphaned, vec![fingerprint]);
    }

    #[tokio::test]
    async fn legacy_dedup_record_without_resolution_refs_needs_rebuild() {
        let (_dir, repo) = new_repo();
        let fingerprint = ImageFingerprint::compute(b"legacy-bytes");
        let master = ImageId::new_v4();
        let legacy_json = serde_json::json!({
            "fingerprint": fingerprint,
            "master_image_id": master,
            "storage_key_original": "images/m/original.png",
            "referencing_ids": [master],
            "created_at": chrono::Utc::now(),
            "updated_at": chrono::Utc::now(),
        });
        repo.kv
            .put(
                &keys::dedup_key(&fingerprint.storage_key()),
                Bytes::from(serde_json::to_vec(&legacy_json).unwrap()),
                None,
            )
            .await
            .unwrap();
        let fetched = repo.get_dedup(&fingerprint).await.unwrap().unwrap();
        assert!(fetched.needs_rebuild);
        assert!(fetched.resolution_refs.is_empty());
    }

    #[tokio::test]
    async fn statistics_counts_images_and_dedup_records() {
        let (_dir, repo) = new_repo();
        let record = sample_image();
        repo.store_image(&record).await.unwrap();
        let dedup = DeduplicationRecord::new(record.fingerprint.clone(), record.id, "images/x/original.png".to_string());
        repo.store_dedup(&dedup).await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.image_count, 1);
        assert_eq!(stats.dedup_record_count, 1);
        assert_eq!(stats.total_logical_bytes, 42);
    }
}
