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

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use imagevault_error::{make_input_err, Error};
use imagevault_util::fingerprint::{ImageFingerprint, DEFAULT_ALGORITHM};
use imagevault_util::resolution::ResolutionLabel;
use imagevault_util::ImageId;
use serde::{Deserialize, Serialize};

/// The closed set of accepted mime types, spelled out as in `spec.md` §3
/// (`{jpeg, png, gif, webp}`), independent of `imagevault-codec`'s own
/// type so this crate never needs to link against the image-decoding
/// stack.
pub const VALID_MIME_TYPES: [&str; 4] = ["jpeg", "png", "gif", "webp"];

/// Logical image identity, persisted as a flat field→string map on the
/// remote KV backend and as an equivalent JSON object on the embedded
/// backend — both produced by `KvStore::{get,put}_fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub original_filename: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    /// Never includes the literal `"original"` — its presence is implicit,
    /// per `imagevault_util::resolution::has_resolution`.
    pub resolutions: Vec<ResolutionLabel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fingerprint: ImageFingerprint,
    pub is_deduped: bool,
    pub shared_image_id: Option<ImageId>,
}

impl ImageRecord {
    pub fn validate(&self) -> Result<(), Error> {
        if self.original_filename.is_empty() {
            return Err(make_input_err!("original_filename must not be empty"));
        }
        if !VALID_MIME_TYPES.contains(&self.mime_type.as_str()) {
            return Err(make_input_err!("Unsupported mime_type '{}'", self.mime_type));
        }
        let mut seen = BTreeSet::new();
        for label in &self.resolutions {
            if label.is_original() {
                return Err(make_input_err!(
                    "resolutions must not list 'original' explicitly"
                ));
            }
            if !seen.insert(*label) {
                return Err(make_input_err!("resolutions must not contain duplicates"));
            }
        }
        if self.is_deduped {
            match self.shared_image_id {
                Some(shared) if shared != self.id => {}
                Some(_) => return Err(make_input_err!("shared_image_id must differ from id")),
                None => return Err(make_input_err!("is_deduped requires a shared_image_id")),
            }
        }
        Ok(())
    }

    /// Encodes this record as the flat field→string map written via
    /// `KvStore::put_fields`.
    pub fn to_field_map(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), self.id.to_string());
        fields.insert("original_filename".to_string(), self.original_filename.clone());
        fields.insert("mime_type".to_string(), self.mime_type.clone());
        fields.insert("byte_size".to_string(), self.byte_size.to_string());
        fields.insert("width".to_string(), self.width.to_string());
        fields.insert("height".to_string(), self.height.to_string());
        fields.insert(
            "resolutions".to_string(),
            self.resolutions
                .iter()
                .map(|r| r.canonical())
                .collect::<Vec<_>>()
                .join(","),
        );
        fields.insert("created_at".to_string(), self.created_at.to_rfc3339());
        fields.insert("updated_at".to_string(), self.updated_at.to_rfc3339());
        fields.insert("fingerprint_algorithm".to_string(), self.fingerprint.algorithm.clone());
        fields.insert("fingerprint_digest".to_string(), self.fingerprint.digest.clone());
        fields.insert(
            "fingerprint_byte_size".to_string(),
            self.fingerprint.byte_size.to_string(),
        );
        fields.insert("is_deduped".to_string(), self.is_deduped.to_string());
        if let Some(shared) = self.shared_image_id {
            fields.insert("shared_image_id".to_string(), shared.to_string());
        }
        fields
    }

    /// Decodes a field map back into a record. Per `spec.md` §4.2/§6,
    /// legacy records without deduplication fields are tolerated: an
    /// absent `fingerprint_digest` decodes to an empty fingerprint, an
    /// absent `is_deduped` decodes to `false`, and an absent `algorithm`
    /// with a present digest defaults to SHA-256.
    pub fn from_field_map(fields: &HashMap<String, String>) -> Result<Self, Error> {
        let get = |key: &str| fields.get(key).map(|s| s.as_str());
        let id: ImageId = get("id")
            .ok_or_else(|| make_input_err!("Missing required field 'id'"))?
            .parse()
            .map_err(|_| make_input_err!("Malformed 'id' field"))?;
        let original_filename = get("original_filename").unwrap_or_default().to_string();
        let mime_type = get("mime_type").unwrap_or_default().to_string();
        let byte_size = get("byte_size").unwrap_or("0").parse().unwrap_or(0);
        let width = get("width").unwrap_or("0").parse().unwrap_or(0);
        let height = get("height").unwrap_or("0").parse().unwrap_or(0);
        let resolutions = match get("resolutions") {
            Some(s) if !s.is_empty() => s
                .split(',')
                .map(ResolutionLabel::parse)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        let created_at = get("created_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let updated_at = get("updated_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(created_at);

        let digest = get("fingerprint_digest").unwrap_or_default().to_string();
        let algorithm = match get("fingerprint_algorithm") {
            Some(a) if !a.is_empty() => a.to_string(),
            _ if !digest.is_empty() => DEFAULT_ALGORITHM.to_string(),
            _ => String::new(),
        };
        let fingerprint_byte_size = get("fingerprint_byte_size").unwrap_or("0").parse().unwrap_or(0);
        let fingerprint = ImageFingerprint {
            algorithm,
            digest,
            byte_size: fingerprint_byte_size,
        };

        let is_deduped = get("is_deduped").map(|s| s == "true").unwrap_or(false);
        let shared_image_id = get("shared_image_id").and_then(|s| s.parse().ok());

        Ok(ImageRecord {
            id,
            original_filename,
            mime_type,
            byte_size,
            width,
            height,
            resolutions,
            created_at,
            updated_at,
            fingerprint,
            is_deduped,
            shared_image_id,
        })
    }
}

/// Per-fingerprint reference graph tracking which images share bytes
/// under a single master's storage prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationRecord {
    pub fingerprint: ImageFingerprint,
    pub master_image_id: ImageId,
    pub storage_key_original: String,
    pub referencing_ids: BTreeSet<ImageId>,
    #[serde(default)]
    pub resolution_refs: BTreeMap<String, BTreeSet<ImageId>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set by `MetadataRepository::get_dedup` when the stored JSON lacked
    /// a `resolution_refs` key at all (as opposed to an empty one),
    /// signaling the legacy rebuild protocol of `spec.md` §4.5.8 must run.
    /// Never itself persisted.
    #[serde(skip)]
    pub needs_rebuild: bool,
}

impl DeduplicationRecord {
    pub fn new(fingerprint: ImageFingerprint, master_image_id: ImageId, storage_key_original: String) -> Self {
        let now = Utc::now();
        let mut referencing_ids = BTreeSet::new();
        referencing_ids.insert(master_image_id);
        let mut resolution_refs = BTreeMap::new();
        resolution_refs.insert("original".to_string(), referencing_ids.clone());
        DeduplicationRecord {
            fingerprint,
            master_image_id,
            storage_key_original,
            referencing_ids,
            resolution_refs,
            created_at: now,
            updated_at: now,
            needs_rebuild: false,
        }
    }

    /// A record is orphaned once nobody references its bytes anymore; it
    /// must then be removed and its physical bytes purged.
    pub fn is_orphaned(&self) -> bool {
        self.referencing_ids.is_empty()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ImageRecord {
        let id = ImageId::new_v4();
        ImageRecord {
            id,
            original_filename: "cat.png".to_string(),
            mime_type: "png".to_string(),
            byte_size: 1234,
            width: 10,
            height: 20,
            resolutions: vec![ResolutionLabel::Thumbnail],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            fingerprint: ImageFingerprint::compute(b"hello"),
            is_deduped: false,
            shared_image_id: None,
        }
    }

    #[test]
    fn round_trips_through_field_map() {
        let record = sample_record();
        let fields = record.to_field_map();
        let decoded = ImageRecord::from_field_map(&fields).unwrap();
        assert_eq!(decoded.id, record.id);
        assert_eq!(decoded.mime_type, record.mime_type);
        assert_eq!(decoded.resolutions, record.resolutions);
        assert_eq!(decoded.fingerprint, record.fingerprint);
    }

    #[test]
    fn legacy_field_map_defaults_dedup_fields() {
        let record = sample_record();
        let mut fields = record.to_field_map();
        fields.remove("is_deduped");
        fields.remove("shared_image_id");
        fields.remove("fingerprint_algorithm");
        fields.remove("fingerprint_digest");
        fields.remove("fingerprint_byte_size");
        let decoded = ImageRecord::from_field_map(&fields).unwrap();
        assert!(!decoded.is_deduped);
        assert_eq!(decoded.shared_image_id, None);
        assert!(decoded.fingerprint.is_empty());
    }

    #[test]
    fn missing_algorithm_with_digest_defaults_to_sha256() {
        let record = sample_record();
        let mut fields = record.to_field_map();
        fields.remove("fingerprint_algorithm");
        let decoded = ImageRecord::from_field_map(&fields).unwrap();
        assert_eq!(decoded.fingerprint.algorithm, DEFAULT_ALGORITHM);
    }

    #[test]
    fn validate_rejects_empty_filename() {
        let mut record = sample_record();
        record.original_filename = String::new();
        assert!(record.validate().is_err());
    }

    #[test]
    fn validate_rejects_deduped_without_shared_id() {
        let mut record = sample_record();
        record.is_deduped = true;
        record.shared_image_id = None;
        assert!(record.validate().is_err());
    }

    #[test]
    fn validate_rejects_explicit_original_in_resolutions() {
        let mut record = sample_record();
        record.resolutions.push(ResolutionLabel::Original);
        assert!(record.validate().is_err());
    }

    #[test]
    fn dedup_record_starts_with_master_as_sole_reference() {
        let master = ImageId::new_v4();
        let record = DeduplicationRecord::new(ImageFingerprint::compute(b"x"), master, "images/x/original.png".to_string());
        assert_eq!(record.referencing_ids, BTreeSet::from([master]));
        assert_eq!(record.resolution_refs["original"], BTreeSet::from([master]));
        assert!(!record.is_orphaned());
    }
}
