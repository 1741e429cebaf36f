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

use imagevault_meta::ImageRecord;
use imagevault_service::UploadOutcome;
use imagevault_util::ImageId;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
pub struct UploadResponse {
    pub id: ImageId,
    pub materialized_resolutions: Vec<String>,
    pub sizes: HashMap<String, (u32, u32)>,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        UploadResponse {
            id: outcome.id,
            materialized_resolutions: outcome.materialized_labels.iter().map(|l| l.canonical()).collect(),
            sizes: outcome.sizes,
        }
    }
}

#[derive(Serialize)]
pub struct ImageRecordResponse {
    pub id: ImageId,
    pub original_filename: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    pub resolutions: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub is_deduped: bool,
    pub shared_image_id: Option<ImageId>,
}

impl From<ImageRecord> for ImageRecordResponse {
    fn from(record: ImageRecord) -> Self {
        ImageRecordResponse {
            id: record.id,
            original_filename: record.original_filename,
            mime_type: record.mime_type,
            byte_size: record.byte_size,
            width: record.width,
            height: record.height,
            resolutions: record.resolutions.iter().map(|l| l.canonical()).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            is_deduped: record.is_deduped,
            shared_image_id: record.shared_image_id,
        }
    }
}
