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

//! Bridges `imagevault-codec`'s `MimeType` (decoupled from this crate's
//! storage concerns) to the plain strings `imagevault-meta::ImageRecord`
//! persists and the file extensions the object store keys use.

use imagevault_codec::MimeType;
use imagevault_error::{make_err, Code, Error};

/// `ImageRecord::mime_type` is always the short form (`"jpeg"`, not
/// `"image/jpeg"`); every variant of an image is assumed to share the
/// original's format, so this is the only place file extension is derived.
pub fn short_name(mime: MimeType) -> &'static str {
    match mime {
        MimeType::Jpeg => "jpeg",
        MimeType::Png => "png",
        MimeType::Gif => "gif",
        MimeType::WebP => "webp",
    }
}

pub fn extension_for_short_name(short: &str) -> Result<&'static str, Error> {
    match short {
        "jpeg" => Ok("jpg"),
        "png" => Ok("png"),
        "gif" => Ok("gif"),
        "webp" => Ok("webp"),
        other => Err(make_err!(Code::Internal, "Unknown stored mime_type '{other}'")),
    }
}

pub fn codec_mime_for_short_name(short: &str) -> Result<MimeType, Error> {
    match short {
        "jpeg" => Ok(MimeType::Jpeg),
        "png" => Ok(MimeType::Png),
        "gif" => Ok(MimeType::Gif),
        "webp" => Ok(MimeType::WebP),
        other => Err(make_err!(Code::Internal, "Unknown stored mime_type '{other}'")),
    }
}

pub fn content_type_for_short_name(short: &str) -> &'static str {
    match short {
        "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
