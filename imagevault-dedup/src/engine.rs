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

//! Deduplication Engine (C5): fingerprinting, two-stage duplicate
//! detection, and reference-graph mutation. Owns the invariant that every
//! variant of an image lives under its master's storage prefix.

use std::collections::BTreeMap;
use std::sync::Arc;

use imagevault_error::{Code, Error, ResultExt};
use imagevault_meta::{DeduplicationRecord, ImageRecord, MetadataRepository};
use imagevault_store::ObjectStore;
use imagevault_util::fingerprint::ImageFingerprint;
use imagevault_util::resolution::ResolutionLabel;
use imagevault_util::ImageId;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// No existing fingerprint match; caller must register a first
    /// writer (`spec.md` §4.5.3).
    Unique,
    /// An existing fingerprint matched and (where verifiable) the bytes
    /// agreed; caller must register a subsequent reference (§4.5.4).
    Duplicate { master_image_id: ImageId },
}

pub struct DeduplicationEngine {
    store: Arc<dyn ObjectStore>,
    meta: Arc<MetadataRepository>,
}

impl DeduplicationEngine {
    pub fn new(store: Arc<dyn ObjectStore>, meta: Arc<MetadataRepository>) -> Self {
        DeduplicationEngine { store, meta }
    }

    /// Stage 1 (fingerprint lookup) + Stage 2 (byte-for-byte
    /// verification), per `spec.md` §4.5.2. A Stage 1 hit whose bytes
    /// turn out not to match is logged as a suspected hash collision and
    /// treated as unique.
    pub async fn detect(&self, bytes: &[u8], fingerprint: &ImageFingerprint, cancel: &CancellationToken) -> Result<DetectionOutcome, Error> {
        let Some(dedup) = self.meta.find_by_fingerprint(fingerprint).await? else {
            return Ok(DetectionOutcome::Unique);
        };
        let master = dedup.master_image_id;
        match self.store.download(&dedup.storage_key_original, cancel).await {
            Ok(mut stream) => {
                let mut existing = Vec::new();
                stream
                    .read_to_end(&mut existing)
                    .await
                    .err_tip(|| "detect: failed reading master original for comparison")?;
                if existing == bytes {
                    Ok(DetectionOutcome::Duplicate { master_image_id: master })
                } else {
                    tracing::warn!(
                        fingerprint = %fingerprint.storage_key(),
                        master = %master,
                        "suspected hash collision at stage 2; treating upload as unique"
                    );
                    Ok(DetectionOutcome::Unique)
                }
            }
            // Fingerprint matched but the master's bytes are missing: an
            // orphan fingerprint. Treat as a duplicate and let
            // `register_subsequent_reference`'s orphan heal (§4.5.4)
            // re-upload under the master's key.
            Err(e) if e.code == Code::NotFound => Ok(DetectionOutcome::Duplicate { master_image_id: master }),
            Err(e) => Err(e.append("detect: failed downloading master original")),
        }
    }

    /// §4.5.3: the first writer of a previously-unseen fingerprint.
    pub async fn register_first_writer(
        &self,
        new_id: ImageId,
        fingerprint: ImageFingerprint,
        ext: &str,
        bytes: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<DeduplicationRecord, Error> {
        let storage_key = keys::object_key(new_id, &ResolutionLabel::Original, ext);
        self.store
            .upload(
                &storage_key,
                Box::new(std::io::Cursor::new(bytes.to_vec())),
                bytes.len() as u64,
                content_type,
                cancel,
            )
            .await
            .err_tip(|| format!("register_first_writer: failed to upload original for {new_id}"))?;
        let record = DeduplicationRecord::new(fingerprint, new_id, storage_key);
        self.meta
            .store_dedup(&record)
            .await
            .err_tip(|| "register_first_writer: failed to persist dedup record")?;
        Ok(record)
    }

    /// §4.5.4: a subsequent reference to an existing fingerprint. Heals
    /// an orphan fingerprint (master bytes missing) by re-uploading `B`
    /// under the master's key rather than minting a new master.
    pub async fn register_subsequent_reference(
        &self,
        new_id: ImageId,
        fingerprint: &ImageFingerprint,
        bytes: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageId, Error> {
        let mut dedup = self
            .meta
            .find_by_fingerprint(fingerprint)
            .await?
            .err_tip_with_code(|_| (Code::NotFound, "dedup record vanished between detect and register".to_string()))?;
        self.rebuild_resolution_refs(&mut dedup).await?;

        let exists = self.store.exists(&dedup.storage_key_original, cancel).await?;
        if !exists {
            tracing::warn!(
                master = %dedup.master_image_id,
                key = %dedup.storage_key_original,
                "orphan fingerprint pointing at missing bytes; healing by re-upload"
            );
            self.store
                .upload(&dedup.storage_key_original, Box::new(std::io::Cursor::new(bytes.to_vec())), bytes.len() as u64, content_type, cancel)
                .await
                .err_tip(|| "register_subsequent_reference: failed to heal orphan master")?;
        }

        dedup.referencing_ids.insert(new_id);
        dedup
            .resolution_refs
            .entry(ResolutionLabel::Original.canonical())
            .or_default()
            .insert(new_id);
        self.meta
            .update_dedup(&mut dedup)
            .await
            .err_tip(|| "register_subsequent_reference: failed to persist updated dedup record")?;
        Ok(dedup.master_image_id)
    }

    /// §4.5.5: materializes `label` for `requester_id`, sharing
    /// already-materialized bytes when present. `resize` is called only
    /// when the variant does not already exist. Returns the storage key
    /// the variant now lives at.
    pub async fn materialize_resolution(
        &self,
        fingerprint: &ImageFingerprint,
        requester_id: ImageId,
        label: ResolutionLabel,
        ext: &str,
        content_type: &str,
        resize: impl FnOnce(&[u8]) -> Result<Vec<u8>, Error>,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        let mut dedup = self
            .meta
            .find_by_fingerprint(fingerprint)
            .await?
            .err_tip_with_code(|_| (Code::NotFound, "dedup record not found during materialization".to_string()))?;
        self.rebuild_resolution_refs(&mut dedup).await?;

        let label_key = label.canonical();
        let already_materialized = dedup
            .resolution_refs
            .get(&label_key)
            .map(|refs| !refs.is_empty())
            .unwrap_or(false);

        let key = keys::object_key(dedup.master_image_id, &label, ext);
        if !already_materialized {
            let mut stream = self
                .store
                .download(&dedup.storage_key_original, cancel)
                .await
                .err_tip(|| "materialize_resolution: failed to download original")?;
            let mut original_bytes = Vec::new();
            stream
                .read_to_end(&mut original_bytes)
                .await
                .err_tip(|| "materialize_resolution: failed to read original")?;
            let resized = resize(&original_bytes)?;
            self.store
                .upload(&key, Box::new(std::io::Cursor::new(resized.clone())), resized.len() as u64, content_type, cancel)
                .await
                .err_tip(|| "materialize_resolution: failed to upload variant")?;
        }

        dedup.resolution_refs.entry(label_key).or_default().insert(requester_id);
        self.meta
            .update_dedup(&mut dedup)
            .await
            .err_tip(|| "materialize_resolution: failed to persist updated dedup record")?;
        Ok(key)
    }

    /// §4.5.6: resolves `(image_id, label)` to a storage key without ever
    /// inserting the requesting id into the key.
    pub fn resolve_storage_key(record: &ImageRecord, label: &ResolutionLabel, ext: &str) -> String {
        let owner = if record.is_deduped {
            record.shared_image_id.unwrap_or(record.id)
        } else {
            record.id
        };
        keys::object_key(owner, label, ext)
    }

    /// §4.5.7: removes `record`'s references from its fingerprint's
    /// reference graph and performs best-effort physical cleanup. Never
    /// fails the logical delete; storage-side failures are logged.
    pub async fn remove_reference(&self, record: &ImageRecord, ext: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let Some(mut dedup) = self.meta.find_by_fingerprint(&record.fingerprint).await? else {
            let prefix = keys::object_prefix(record.id);
            if let Err(e) = self.store.delete_prefix(&prefix, cancel).await {
                tracing::warn!(error = %e, image_id = %record.id, "best-effort delete_prefix failed with no dedup record");
            }
            return Ok(());
        };

        let mut labels = vec![ResolutionLabel::Original.canonical()];
        labels.extend(record.resolutions.iter().map(|l| l.canonical()));

        let mut physical_keys_to_delete = Vec::new();
        for label in &labels {
            if let Some(refs) = dedup.resolution_refs.get_mut(label) {
                refs.remove(&record.id);
                if refs.is_empty() {
                    let key = format!("images/{}/{label}.{ext}", dedup.master_image_id);
                    match self.store.exists(&key, cancel).await {
                        Ok(true) => physical_keys_to_delete.push(key),
                        Ok(false) => {}
                        Err(e) => tracing::warn!(error = %e, key = %key, "exists check failed; skipping physical delete"),
                    }
                }
            }
        }
        dedup.referencing_ids.remove(&record.id);

        for key in &physical_keys_to_delete {
            if let Err(e) = self.store.delete(key, cancel).await {
                tracing::warn!(error = %e, key = %key, "best-effort physical delete failed");
            }
        }

        if dedup.is_orphaned() {
            if let Err(e) = self.store.delete_prefix(&keys::object_prefix(dedup.master_image_id), cancel).await {
                tracing::warn!(error = %e, master = %dedup.master_image_id, "best-effort delete_prefix failed for orphaned master");
            }
            if let Err(e) = self.meta.delete_dedup(&record.fingerprint).await {
                tracing::warn!(error = %e, "failed to delete orphaned dedup record");
            }
        } else if let Err(e) = self.meta.update_dedup(&mut dedup).await {
            tracing::warn!(error = %e, "failed to persist dedup record after reference removal");
        }

        Ok(())
    }

    /// Single-label variant of §4.5.7, used by the Image Service's
    /// `delete_resolution` (never called with `"original"`, which that
    /// operation refuses outright).
    pub async fn remove_single_resolution_reference(
        &self,
        record: &ImageRecord,
        label: &ResolutionLabel,
        ext: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let Some(mut dedup) = self.meta.find_by_fingerprint(&record.fingerprint).await? else {
            return Ok(());
        };
        let label_key = label.canonical();
        if let Some(refs) = dedup.resolution_refs.get_mut(&label_key) {
            refs.remove(&record.id);
            if refs.is_empty() {
                let key = keys::object_key(dedup.master_image_id, label, ext);
                match self.store.exists(&key, cancel).await {
                    Ok(true) => {
                        if let Err(e) = self.store.delete(&key, cancel).await {
                            tracing::warn!(error = %e, key = %key, "best-effort physical delete failed for single resolution");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, key = %key, "exists check failed; skipping physical delete"),
                }
            }
        }
        if let Err(e) = self.meta.update_dedup(&mut dedup).await {
            tracing::warn!(error = %e, "failed to persist dedup record after single-resolution removal");
        }
        Ok(())
    }

    /// §4.5.8: the only path that writes `resolution_refs` without a
    /// corresponding upload — reconstructs it from `referencing_ids` and
    /// each member's `ImageRecord`.
    pub async fn rebuild_resolution_refs(&self, dedup: &mut DeduplicationRecord) -> Result<(), Error> {
        if !dedup.needs_rebuild {
            return Ok(());
        }
        let mut rebuilt: BTreeMap<String, std::collections::BTreeSet<ImageId>> = BTreeMap::new();
        for id in dedup.referencing_ids.clone() {
            rebuilt.entry(ResolutionLabel::Original.canonical()).or_default().insert(id);
            if let Some(member) = self.meta.get_image(id).await? {
                for label in &member.resolutions {
                    rebuilt.entry(label.canonical()).or_default().insert(id);
                }
            }
        }
        dedup.resolution_refs = rebuilt;
        dedup.needs_rebuild = false;
        self.meta
            .update_dedup(dedup)
            .await
            .err_tip(|| "rebuild_resolution_refs: failed to persist rebuilt record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagevault_store::MemoryObjectStore;

    async fn new_fixture() -> (tempfile::TempDir, DeduplicationEngine, Arc<MetadataRepository>) {
        let dir = tempfile::tempdir().unwrap();
        let kv = imagevault_kv::embedded::EmbeddedKvStore::open(dir.path().to_str().unwrap()).unwrap();
        let meta = Arc::new(MetadataRepository::new(Arc::new(kv)));
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let engine = DeduplicationEngine::new(store, meta.clone());
        (dir, engine, meta)
    }

    #[tokio::test]
    async fn first_upload_is_unique_and_registers_master() {
        let (_dir, engine, _meta) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = b"hello world".to_vec();
        let fingerprint = ImageFingerprint::compute(&bytes);
        let outcome = engine.detect(&bytes, &fingerprint, &cancel).await.unwrap();
        assert_eq!(outcome, DetectionOutcome::Unique);

        let new_id = ImageId::new_v4();
        let record = engine
            .register_first_writer(new_id, fingerprint, "jpg", &bytes, "image/jpeg", &cancel)
            .await
            .unwrap();
        assert_eq!(record.master_image_id, new_id);
        assert_eq!(record.referencing_ids, std::collections::BTreeSet::from([new_id]));
    }

    #[tokio::test]
    async fn second_upload_of_same_bytes_is_detected_as_duplicate() {
        let (_dir, engine, _meta) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = b"shared content".to_vec();
        let fingerprint = ImageFingerprint::compute(&bytes);

        let first_id = ImageId::new_v4();
        engine
            .register_first_writer(first_id, fingerprint.clone(), "png", &bytes, "image/png", &cancel)
            .await
            .unwrap();

        let outcome = engine.detect(&bytes, &fingerprint, &cancel).await.unwrap();
        assert_eq!(outcome, DetectionOutcome::Duplicate { master_image_id: first_id });

        let second_id = ImageId::new_v4();
        let master = engine
            .register_subsequent_reference(second_id, &fingerprint, &bytes, "image/png", &cancel)
            .await
            .unwrap();
        assert_eq!(master, first_id);
    }

    /// B4: a Stage 1 fingerprint hit whose Stage 2 byte comparison
    /// disagrees is a suspected hash collision, not a duplicate — the
    /// upload is treated as unique and the existing master's bytes are
    /// left untouched.
    #[tokio::test]
    async fn stage2_byte_mismatch_is_treated_as_unique_and_master_is_untouched() {
        let (_dir, engine, _meta) = new_fixture().await;
        let cancel = CancellationToken::new();
        let master_bytes = b"original master bytes".to_vec();
        let fingerprint = ImageFingerprint::compute(&master_bytes);

        let master_id = ImageId::new_v4();
        engine
            .register_first_writer(master_id, fingerprint.clone(), "png", &master_bytes, "image/png", &cancel)
            .await
            .unwrap();

        // Different bytes presented under the master's fingerprint key,
        // simulating a hash collision at Stage 1.
        let colliding_bytes = b"completely different content".to_vec();
        let outcome = engine.detect(&colliding_bytes, &fingerprint, &cancel).await.unwrap();
        assert_eq!(outcome, DetectionOutcome::Unique);

        let master_key = keys::object_key(master_id, &ResolutionLabel::Original, "png");
        let mut stream = engine.store.download(&master_key, &cancel).await.unwrap();
        let mut stored = Vec::new();
        stream.read_to_end(&mut stored).await.unwrap();
        assert_eq!(stored, master_bytes);
    }

    #[tokio::test]
    async fn delete_of_one_duplicate_preserves_the_other() {
        let (_dir, engine, meta) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = b"shared content for delete test".to_vec();
        let fingerprint = ImageFingerprint::compute(&bytes);

        let a_id = ImageId::new_v4();
        engine
            .register_first_writer(a_id, fingerprint.clone(), "png", &bytes, "image/png", &cancel)
            .await
            .unwrap();
        let c_id = ImageId::new_v4();
        engine
            .register_subsequent_reference(c_id, &fingerprint, &bytes, "image/png", &cancel)
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let a_record = ImageRecord {
            id: a_id,
            original_filename: "a.png".to_string(),
            mime_type: "png".to_string(),
            byte_size: bytes.len() as u64,
            width: 1,
            height: 1,
            resolutions: vec![],
            created_at: now,
            updated_at: now,
            fingerprint: fingerprint.clone(),
            is_deduped: false,
            shared_image_id: None,
        };
        meta.store_image(&a_record).await.unwrap();

        engine.remove_reference(&a_record, "png", &cancel).await.unwrap();
        meta.delete_image(a_id).await.unwrap();

        let dedup = meta.find_by_fingerprint(&fingerprint).await.unwrap().unwrap();
        assert!(!dedup.referencing_ids.contains(&a_id));
        assert!(dedup.referencing_ids.contains(&c_id));

        let c_owner_key = keys::object_key(a_id, &ResolutionLabel::Original, "png");
        assert!(engine.store.exists(&c_owner_key, &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn resolve_storage_key_never_uses_requesting_id_when_deduped() {
        let master = ImageId::new_v4();
        let requester = ImageId::new_v4();
        let now = chrono::Utc::now();
        let record = ImageRecord {
            id: requester,
            original_filename: "dup.png".to_string(),
            mime_type: "png".to_string(),
            byte_size: 1,
            width: 1,
            height: 1,
            resolutions: vec![],
            created_at: now,
            updated_at: now,
            fingerprint: ImageFingerprint::compute(b"x"),
            is_deduped: true,
            shared_image_id: Some(master),
        };
        let key = DeduplicationEngine::resolve_storage_key(&record, &ResolutionLabel::Original, "png");
        assert_eq!(key, format!("images/{master}/original.png"));
        assert!(!key.contains(&requester.to_string()));
    }

    #[tokio::test]
    async fn rebuild_reconstructs_resolution_refs_from_referencing_images() {
        let (_dir, engine, meta) = new_fixture().await;
        let cancel = CancellationToken::new();
        let bytes = b"legacy bytes".to_vec();
        let fingerprint = ImageFingerprint::compute(&bytes);
        let master = ImageId::new_v4();
        engine
            .register_first_writer(master, fingerprint.clone(), "png", &bytes, "image/png", &cancel)
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let master_record = ImageRecord {
            id: master,
            original_filename: "m.png".to_string(),
            mime_type: "png".to_string(),
            byte_size: bytes.len() as u64,
            width: 1,
            height: 1,
            resolutions: vec![ResolutionLabel::Thumbnail],
            created_at: now,
            updated_at: now,
            fingerprint: fingerprint.clone(),
            is_deduped: false,
            shared_image_id: None,
        };
        meta.store_image(&master_record).await.unwrap();

        let mut dedup = meta.find_by_fingerprint(&fingerprint).await.unwrap().unwrap();
        dedup.needs_rebuild = true;
        dedup.resolution_refs.clear();
        engine.rebuild_resolution_refs(&mut dedup).await.unwrap();

        assert!(!dedup.needs_rebuild);
        assert!(dedup.resolution_refs["original"].contains(&master));
        assert!(dedup.resolution_refs["thumbnail"].contains(&master));
    }
}
