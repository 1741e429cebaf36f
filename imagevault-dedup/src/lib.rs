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

//! Deduplication Engine (C5): fingerprint computation, two-stage
//! duplicate detection, and reference graph mutation across the
//! Metadata Repository (C3) and Object Store Adapter (C1).

pub mod engine;
pub mod keys;

pub use engine::{DeduplicationEngine, DetectionOutcome};
