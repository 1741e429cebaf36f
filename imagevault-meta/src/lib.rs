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

//! Metadata Repository (C3): a typed layer over the KV Backend (C2) —
//! image records, deduplication records, the presigned-URL cache, and
//! statistics aggregation.

pub mod keys;
pub mod records;
pub mod repository;

pub use records::{DeduplicationRecord, ImageRecord, VALID_MIME_TYPES};
pub use repository::{MetadataRepository, RepositoryStatistics};
