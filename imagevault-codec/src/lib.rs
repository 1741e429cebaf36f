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

//! Image Codec (C4): decode, measure, encode, and resize pixel buffers.
//! A pure function of bytes in, bytes out — no I/O, no configuration
//! loading, no knowledge of image identity or storage.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use imagevault_error::{make_err, make_input_err, Code, Error};

/// The closed set of accepted mime types, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
            MimeType::Gif => "image/gif",
            MimeType::WebP => "image/webp",
        }
    }

    /// File extension used when constructing object store keys.
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::Jpeg => "jpg",
            MimeType::Png => "png",
            MimeType::Gif => "gif",
            MimeType::WebP => "webp",
        }
    }

    fn to_image_format(self) -> ImageFormat {
        match self {
            MimeType::Jpeg => ImageFormat::Jpeg,
            MimeType::Png => ImageFormat::Png,
            MimeType::Gif => ImageFormat::Gif,
            MimeType::WebP => ImageFormat::WebP,
        }
    }
}

/// `resize()`'s resize mode, mirroring `spec.md` §4.4. Kept independent of
/// any configuration type so this crate stays a pure function of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    SmartFit,
    Crop,
    Stretch,
}

#[derive(Debug, Clone)]
pub struct ResizeConfig {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub format: MimeType,
    pub mode: ResizeMode,
    /// `#RRGGBB` or `#RRGGBBAA`, used only by `ResizeMode::SmartFit`.
    pub background: String,
}

/// Detects the mime type from magic bytes. Rejects anything outside the
/// closed set {jpeg, png, gif, webp}.
pub fn detect_mime(bytes: &[u8]) -> Result<MimeType, Error> {
    let format = image::guess_format(bytes)
        .map_err(|e| make_err!(Code::FailedPrecondition, "Unrecognized image format: {e}"))?;
    match format {
        ImageFormat::Jpeg => Ok(MimeType::Jpeg),
        ImageFormat::Png => Ok(MimeType::Png),
        ImageFormat::Gif => Ok(MimeType::Gif),
        ImageFormat::WebP => Ok(MimeType::WebP),
        other => Err(make_err!(
            Code::FailedPrecondition,
            "Unsupported image format {other:?}"
        )),
    }
}

/// Returns `(width, height)` without fully decoding pixel data where the
/// underlying codec supports it.
pub fn dimensions(bytes: &[u8]) -> Result<(u32, u32), Error> {
    let reader = image::io::Reader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| make_err!(Code::FailedPrecondition, "Could not read image header: {e}"))?;
    reader
        .into_dimensions()
        .map_err(|e| make_err!(Code::FailedPrecondition, "Could not determine dimensions: {e}"))
}

/// Validates that `bytes` decodes as a supported image and stays within
/// `max_bytes`. Does not fully decode pixels — magic-byte + header checks
/// only, matching the contract's "validate" step ahead of the more
/// expensive `resize`.
pub fn validate(bytes: &[u8], max_bytes: u64) -> Result<(), Error> {
    if bytes.is_empty() {
        return Err(make_input_err!("Image bytes must not be empty"));
    }
    if bytes.len() as u64 > max_bytes {
        return Err(make_input_err!(
            "Image size {} exceeds configured max {max_bytes}",
            bytes.len()
        ));
    }
    detect_mime(bytes)?;
    dimensions(bytes)?;
    Ok(())
}

/// Resizes `bytes` per `config`, producing bytes encoded in
/// `config.format`. Bit-exact behavior per `spec.md` §4.4:
///
/// - `SmartFit`: scale preserving aspect ratio to fit inside `W×H`, paint
///   a `W×H` canvas filled with `background`, center-paste.
/// - `Crop`: scale preserving aspect ratio to cover `W×H`, center-crop.
/// - `Stretch`: scale to exactly `W×H`, ignoring aspect ratio.
pub fn resize(bytes: &[u8], config: &ResizeConfig) -> Result<Vec<u8>, Error> {
    if config.width == 0 || config.height == 0 {
        return Err(make_input_err!(
            "Resize target {}x{} must be positive",
            config.width,
            config.height
        ));
    }
    if !(1..=100).contains(&config.quality) {
        return Err(make_input_err!(
            "Resize quality {} must be within 1..=100",
            config.quality
        ));
    }
    let source = image::load_from_memory(bytes)
        .map_err(|e| make_err!(Code::FailedPrecondition, "Failed to decode source image: {e}"))?;

    let resized = match config.mode {
        ResizeMode::Stretch => source.resize_exact(config.width, config.height, FilterType::Lanczos3),
        ResizeMode::Crop => {
            let fitted = source.resize_to_fill(config.width, config.height, FilterType::Lanczos3);
            fitted
        }
        ResizeMode::SmartFit => {
            let scaled = source.resize(config.width, config.height, FilterType::Lanczos3);
            paste_on_canvas(&scaled, config.width, config.height, &config.background)?
        }
    };

    encode(&resized, config.format, config.quality)
}

fn paste_on_canvas(
    scaled: &DynamicImage,
    width: u32,
    height: u32,
    background: &str,
) -> Result<DynamicImage, Error> {
    let bg = parse_hex_color(background)?;
    let mut canvas = image::RgbaImage::from_pixel(width, height, bg);
    let (sw, sh) = scaled.dimensions();
    let x_offset = (width.saturating_sub(sw)) / 2;
    let y_offset = (height.saturating_sub(sh)) / 2;
    image::imageops::overlay(&mut canvas, &scaled.to_rgba8(), x_offset as i64, y_offset as i64);
    Ok(DynamicImage::ImageRgba8(canvas))
}

fn parse_hex_color(hex: &str) -> Result<image::Rgba<u8>, Error> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    let parse_channel = |s: &str| -> Result<u8, Error> {
        u8::from_str_radix(s, 16).map_err(|_| make_input_err!("Invalid hex color '{hex}'"))
    };
    match hex.len() {
        6 => Ok(image::Rgba([
            parse_channel(&hex[0..2])?,
            parse_channel(&hex[2..4])?,
            parse_channel(&hex[4..6])?,
            255,
        ])),
        8 => Ok(image::Rgba([
            parse_channel(&hex[0..2])?,
            parse_channel(&hex[2..4])?,
            parse_channel(&hex[4..6])?,
            parse_channel(&hex[6..8])?,
        ])),
        _ => Err(make_input_err!("Invalid hex color '{hex}', expected RRGGBB or RRGGBBAA")),
    }
}

fn encode(image: &DynamicImage, format: MimeType, quality: u8) -> Result<Vec<u8>, Error> {
    let mut out = std::io::Cursor::new(Vec::new());
    match format {
        MimeType::Jpeg => {
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
            encoder
                .encode_image(image)
                .map_err(|e| make_err!(Code::FailedPrecondition, "JPEG encode failed: {e}"))?;
        }
        MimeType::Png => {
            image
                .write_to(&mut out, ImageFormat::Png)
                .map_err(|e| make_err!(Code::FailedPrecondition, "PNG encode failed: {e}"))?;
        }
        MimeType::Gif => {
            image
                .write_to(&mut out, ImageFormat::Gif)
                .map_err(|e| make_err!(Code::FailedPrecondition, "GIF encode failed: {e}"))?;
        }
        MimeType::WebP => {
            // The `image` crate's WebP encoder support is lossless-only
            // and not a compatibility commitment per `spec.md` §4.4; fall
            // back to JPEG, which is.
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
            encoder
                .encode_image(image)
                .map_err(|e| make_err!(Code::FailedPrecondition, "Fallback JPEG encode failed: {e}"))?;
        }
    }
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([10, 20, 30, 255]),
        ));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn detects_png() {
        let bytes = make_png(4, 4);
        assert_eq!(detect_mime(&bytes).unwrap(), MimeType::Png);
    }

    #[test]
    fn reads_dimensions_without_full_decode() {
        let bytes = make_png(16, 9);
        assert_eq!(dimensions(&bytes).unwrap(), (16, 9));
    }

    #[test]
    fn rejects_empty_bytes() {
        assert!(validate(&[], 1024).is_err());
    }

    #[test]
    fn rejects_oversize_bytes() {
        let bytes = make_png(4, 4);
        assert!(validate(&bytes, 1).is_err());
    }

    #[test]
    fn stretch_produces_exact_dimensions() {
        let bytes = make_png(10, 20);
        let config = ResizeConfig {
            width: 50,
            height: 50,
            quality: 90,
            format: MimeType::Png,
            mode: ResizeMode::Stretch,
            background: "#FFFFFF".to_string(),
        };
        let resized = resize(&bytes, &config).unwrap();
        assert_eq!(dimensions(&resized).unwrap(), (50, 50));
    }

    #[test]
    fn smart_fit_produces_exact_canvas_dimensions() {
        let bytes = make_png(100, 50);
        let config = ResizeConfig {
            width: 40,
            height: 40,
            quality: 90,
            format: MimeType::Png,
            mode: ResizeMode::SmartFit,
            background: "#000000".to_string(),
        };
        let resized = resize(&bytes, &config).unwrap();
        assert_eq!(dimensions(&resized).unwrap(), (40, 40));
    }

    #[test]
    fn crop_produces_exact_cover_dimensions() {
        let bytes = make_png(200, 50);
        let config = ResizeConfig {
            width: 30,
            height: 30,
            quality: 90,
            format: MimeType::Png,
            mode: ResizeMode::Crop,
            background: "#FFFFFF".to_string(),
        };
        let resized = resize(&bytes, &config).unwrap();
        assert_eq!(dimensions(&resized).unwrap(), (30, 30));
    }

    #[test]
    fn rejects_bad_hex_color() {
        let bytes = make_png(4, 4);
        let config = ResizeConfig {
            width: 10,
            height: 10,
            quality: 90,
            format: MimeType::Png,
            mode: ResizeMode::SmartFit,
            background: "not-a-color".to_string(),
        };
        assert!(resize(&bytes, &config).is_err());
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let bytes = make_png(4, 4);
        let config = ResizeConfig {
            width: 10,
            height: 10,
            quality: 0,
            format: MimeType::Png,
            mode: ResizeMode::Stretch,
            background: "#FFFFFF".to_string(),
        };
        assert!(resize(&bytes, &config).is_err());
    }
}
