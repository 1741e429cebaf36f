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
use sha2::{Digest, Sha256};

/// Content fingerprint used to key deduplication: a cryptographic digest
/// plus the byte length. Per `spec.md` §4.5.1, including the size turns an
/// accidental hash-prefix collision into a hard-rejected mismatch at
/// Stage 1 without a second network round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ImageFingerprint {
    /// Digest algorithm identifier, e.g. `"sha256"`.
    pub algorithm: String,
    /// Hex-encoded digest.
    pub digest: String,
    pub byte_size: u64,
}

pub const DEFAULT_ALGORITHM: &str = "sha256";

impl ImageFingerprint {
    /// Computes the fingerprint of `bytes` using the default algorithm
    /// (SHA-256).
    pub fn compute(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        ImageFingerprint {
            algorithm: DEFAULT_ALGORITHM.to_string(),
            digest: hex::encode(digest),
            byte_size: bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digest.is_empty()
    }

    /// The flat key used to look the fingerprint up in the KV store:
    /// `{algorithm}:{digest}:{byte_size}`.
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.algorithm, self.digest, self.byte_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_is_deterministic() {
        let a = ImageFingerprint::compute(b"hello world");
        let b = ImageFingerprint::compute(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.byte_size, 11);
        assert_eq!(a.algorithm, DEFAULT_ALGORITHM);
    }

    #[test]
    fn different_bytes_differ() {
        let a = ImageFingerprint::compute(b"hello world");
        let b = ImageFingerprint::compute(b"hello world!");
        assert_ne!(a, b);
    }

    #[test]
    fn size_participates_in_equality() {
        let mut a = ImageFingerprint::compute(b"hello world");
        a.byte_size = 999;
        let b = ImageFingerprint::compute(b"hello world");
        assert_ne!(a, b);
    }
}
