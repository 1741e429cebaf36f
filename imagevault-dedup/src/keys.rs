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

//! Object store key layout, per `spec.md` §3: every variant of an image
//! lives under its *master's* prefix, never under the requesting image's
//! own id — the invariant that makes deletion non-destructive to
//! co-tenants.

use imagevault_util::resolution::ResolutionLabel;
use imagevault_util::ImageId;

pub fn object_key(master: ImageId, label: &ResolutionLabel, ext: &str) -> String {
    format!("images/{master}/{}.{ext}", label.canonical())
}

pub fn object_prefix(master: ImageId) -> String {
    format!("images/{master}")
}
