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

use std::fmt;

use imagevault_error::{make_input_err, Error};
use serde::{Deserialize, Serialize};

/// Process-wide hard cap on any requested resolution dimension. Callers
/// still must pass a `max_width`/`max_height` from configuration; this is
/// only the absolute ceiling configuration can never exceed.
pub const HARD_MAX_DIMENSION: u32 = 8192;

/// `ResolutionLabel` as defined in `spec.md` §3: either the literal
/// `"original"`, the literal `"thumbnail"`, or the canonical `WxH` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResolutionLabel {
    Original,
    Thumbnail,
    Dimensions(u32, u32),
}

impl ResolutionLabel {
    /// Parses a label, rejecting every form other than `"original"`,
    /// `"thumbnail"`, or `WxH` with positive integers not exceeding
    /// `HARD_MAX_DIMENSION`. Callers that also have a configured max
    /// should additionally call `check_within`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        match raw {
            "original" => return Ok(ResolutionLabel::Original),
            "thumbnail" => return Ok(ResolutionLabel::Thumbnail),
            _ => {}
        }
        let (w_str, h_str) = raw
            .split_once('x')
            .ok_or_else(|| make_input_err!("Invalid resolution label '{raw}'"))?;
        let width: u32 = w_str
            .parse()
            .map_err(|_| make_input_err!("Invalid resolution width in '{raw}'"))?;
        let height: u32 = h_str
            .parse()
            .map_err(|_| make_input_err!("Invalid resolution height in '{raw}'"))?;
        if width == 0 || height == 0 {
            return Err(make_input_err!(
                "Resolution '{raw}' must have positive width and height"
            ));
        }
        if width > HARD_MAX_DIMENSION || height > HARD_MAX_DIMENSION {
            return Err(make_input_err!(
                "Resolution '{raw}' exceeds hard cap of {HARD_MAX_DIMENSION}"
            ));
        }
        Ok(ResolutionLabel::Dimensions(width, height))
    }

    /// Validates this label's dimensions (a no-op for `original`/
    /// `thumbnail`) against a configured maximum, per `spec.md` B1.
    pub fn check_within(&self, max_width: u32, max_height: u32) -> Result<(), Error> {
        if let ResolutionLabel::Dimensions(w, h) = *self {
            if w > max_width || h > max_height {
                return Err(make_input_err!(
                    "Resolution {w}x{h} exceeds configured max {max_width}x{max_height}"
                ));
            }
        }
        Ok(())
    }

    /// Whether this is the literal `"original"` label.
    pub fn is_original(&self) -> bool {
        matches!(self, ResolutionLabel::Original)
    }

    pub fn canonical(&self) -> String {
        match self {
            ResolutionLabel::Original => "original".to_string(),
            ResolutionLabel::Thumbnail => "thumbnail".to_string(),
            ResolutionLabel::Dimensions(w, h) => format!("{w}x{h}"),
        }
    }
}

impl fmt::Display for ResolutionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl TryFrom<String> for ResolutionLabel {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Error> {
        ResolutionLabel::parse(&value)
    }
}

impl From<ResolutionLabel> for String {
    fn from(value: ResolutionLabel) -> Self {
        value.canonical()
    }
}

/// Returns true if `label` is already present in `resolutions`, treating
/// `"original"` as always implicitly present — per `spec.md` §3's
/// `has_resolution` predicate.
pub fn has_resolution(resolutions: &[ResolutionLabel], label: &ResolutionLabel) -> bool {
    label.is_original() || resolutions.iter().any(|r| r == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_known_literals() {
        assert_eq!(ResolutionLabel::parse("original").unwrap(), ResolutionLabel::Original);
        assert_eq!(
            ResolutionLabel::parse("thumbnail").unwrap(),
            ResolutionLabel::Thumbnail
        );
    }

    #[test]
    fn parses_dimensions() {
        assert_eq!(
            ResolutionLabel::parse("200x100").unwrap(),
            ResolutionLabel::Dimensions(200, 100)
        );
    }

    #[test]
    fn rejects_malformed_labels() {
        assert!(ResolutionLabel::parse("200").is_err());
        assert!(ResolutionLabel::parse("200x").is_err());
        assert!(ResolutionLabel::parse("0x100").is_err());
        assert!(ResolutionLabel::parse("tiny").is_err());
        assert!(ResolutionLabel::parse("-1x100").is_err());
    }

    #[test]
    fn rejects_above_hard_cap() {
        assert!(ResolutionLabel::parse("10000x10000").is_err());
    }

    #[test]
    fn check_within_enforces_configured_max() {
        let label = ResolutionLabel::parse("5000x5000").unwrap();
        assert!(label.check_within(4096, 4096).is_err());
        assert!(label.check_within(8192, 8192).is_ok());
    }

    #[test]
    fn original_is_always_present() {
        let resolutions = vec![ResolutionLabel::Dimensions(100, 100)];
        assert!(has_resolution(&resolutions, &ResolutionLabel::Original));
        assert!(!has_resolution(&resolutions, &ResolutionLabel::Thumbnail));
    }
}
