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

//! Cross-cutting value types and small traits shared by every
//! `imagevault-*` crate: resolution labels, content fingerprints, the
//! health-indicator trait, and atomic counters.

pub mod fingerprint;
pub mod health;
pub mod metrics;
pub mod resolution;

/// Logical image identity. A thin alias kept so call sites read `ImageId`
/// instead of `uuid::Uuid` everywhere.
pub type ImageId = uuid::Uuid;
