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

//! Image Service (C6): orchestrates upload, variant materialization,
//! retrieval, and deletion, owning invariants across the Object Store
//! Adapter (C1), Metadata Repository (C3), and Deduplication Engine (C5).

mod mime;
mod service;

pub use service::{ImageService, ServiceStatistics, UploadOutcome};
