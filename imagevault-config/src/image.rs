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

use serde::{Deserialize, Serialize};

/// Process-wide hard cap on any requested resolution dimension, regardless
/// of configuration. See `spec.md` §3 `ResolutionLabel`.
pub const HARD_MAX_DIMENSION: u32 = 8192;

#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Preserve aspect ratio, fit inside the target box, pad with
    /// `background`.
    #[default]
    smart_fit,
    /// Preserve aspect ratio, cover the target box, center-crop.
    crop,
    /// Scale to the exact target dimensions, ignoring aspect ratio.
    stretch,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageConfig {
    /// Maximum accepted upload size, in bytes.
    ///
    /// Default: 25 MiB
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Encode quality used for lossy formats, 1-100.
    ///
    /// Default: 85
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// When true, every upload also materializes the `"thumbnail"`
    /// resolution in addition to whatever the caller requested.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub generate_default_resolutions: bool,

    /// Resize algorithm applied to every materialized resolution.
    #[serde(default)]
    pub resize_mode: ResizeMode,

    /// Maximum width accepted for a `WxH` resolution label, clamped to
    /// `HARD_MAX_DIMENSION`.
    ///
    /// Default: 4096
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,

    /// Maximum height accepted for a `WxH` resolution label, clamped to
    /// `HARD_MAX_DIMENSION`.
    ///
    /// Default: 4096
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,

    /// Canvas background color used by `smart_fit`, as a `#RRGGBB` or
    /// `#RRGGBBAA` hex string.
    ///
    /// Default: "#FFFFFF"
    #[serde(default = "default_background")]
    pub background: String,

    /// Pixel dimensions of the `"thumbnail"` resolution label.
    ///
    /// Default: 200x200
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,
}

impl ImageConfig {
    /// Width/height clamped to the process-wide hard cap, applied after
    /// loading so a misconfigured value can never exceed it.
    pub fn effective_max_width(&self) -> u32 {
        self.max_width.min(HARD_MAX_DIMENSION)
    }

    pub fn effective_max_height(&self) -> u32 {
        self.max_height.min(HARD_MAX_DIMENSION)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_file_bytes() -> u64 {
    25 * 1024 * 1024
}

const fn default_quality() -> u8 {
    85
}

const fn default_max_dimension() -> u32 {
    4096
}

fn default_background() -> String {
    "#FFFFFF".to_string()
}

const fn default_thumbnail_width() -> u32 {
    200
}

const fn default_thumbnail_height() -> u32 {
    200
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            max_file_bytes: default_max_file_bytes(),
            quality: default_quality(),
            generate_default_resolutions: default_true(),
            resize_mode: ResizeMode::default(),
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            background: default_background(),
            thumbnail_width: default_thumbnail_width(),
            thumbnail_height: default_thumbnail_height(),
        }
    }
}
