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

//! Typed configuration for the whole service. Values are loaded from an
//! optional JSON5 file and then overridden field-by-field by environment
//! variables, mirroring the teacher's `nativelink-config` + shell-expansion
//! conventions.

pub mod auth;
pub mod cors;
pub mod health;
pub mod image;
pub mod kv;
pub mod logging;
pub mod rate_limit;
pub mod server;

use imagevault_error::{make_err, Code, Error, ResultExt};

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: server::ServerConfig,
    #[serde(default)]
    pub kv: kv::KvConfig,
    #[serde(default)]
    pub store: Option<store::ObjectStoreConfig>,
    #[serde(default)]
    pub image: image::ImageConfig,
    #[serde(default)]
    pub rate_limit: rate_limit::RateLimitConfig,
    #[serde(default)]
    pub logging: logging::LoggingConfig,
    #[serde(default)]
    pub cors: cors::CorsConfig,
    #[serde(default)]
    pub health: health::HealthConfig,
    #[serde(default)]
    pub auth: auth::AuthConfig,
}

pub mod store;

impl Config {
    /// Parses a JSON5 document (shell-expanding every string value first,
    /// the way `nativelink-config` does) into a `Config`.
    pub fn from_json5(text: &str) -> Result<Self, Error> {
        let expanded = shellexpand::env(text)
            .map(|cow| cow.into_owned())
            .unwrap_or_else(|_| text.to_string());
        serde_json5::from_str(&expanded)
            .map_err(|e| make_err!(Code::Fatal, "Failed to parse config: {e}"))
    }

    /// Loads configuration from a file path, falling back to built-in
    /// defaults if no path is given.
    pub fn load(path: Option<&str>) -> Result<Self, Error> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let text = std::fs::read_to_string(path)
            .err_tip(|| format!("Failed to read config file {path}"))?;
        Self::from_json5(&text)
    }

    /// Validates cross-field invariants that a plain `#[serde(default)]`
    /// cannot express: the object store must be configured, dimension caps
    /// must not exceed the hard cap, and CORS settings must not request an
    /// impossible combination.
    pub fn validate(&self) -> Result<(), Error> {
        if self.store.is_none() {
            return Err(make_err!(
                Code::Fatal,
                "object store configuration is required"
            ));
        }
        if self.image.max_width == 0 || self.image.max_height == 0 {
            return Err(make_err!(
                Code::Fatal,
                "image.max_width and image.max_height must be positive"
            ));
        }
        if self.cors.enabled && self.cors.allow_all_origins && self.cors.allow_credentials {
            return Err(make_err!(
                Code::Fatal,
                "cors.allow_all_origins cannot be combined with cors.allow_credentials"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json5() {
        let text = r#"{
            store: { bucket: "images", region: "us-east-1" },
        }"#;
        let cfg = Config::from_json5(text).unwrap();
        assert_eq!(cfg.image.quality, 85);
        assert_eq!(cfg.store.unwrap().bucket, "images");
    }

    #[test]
    fn validate_rejects_missing_store() {
        let cfg = Config::default();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code, Code::Fatal);
    }

    #[test]
    fn validate_rejects_incompatible_cors() {
        let mut cfg = Config::default();
        cfg.store = Some(store::ObjectStoreConfig {
            endpoint: None,
            bucket: "b".to_string(),
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            tls: true,
            presign_expiry_seconds: 3600,
            key_prefix: None,
        });
        cfg.cors.enabled = true;
        cfg.cors.allow_all_origins = true;
        cfg.cors.allow_credentials = true;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code, Code::Fatal);
    }
}
