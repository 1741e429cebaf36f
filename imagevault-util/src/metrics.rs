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

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic hit/miss counters, used by the embedded KV backend to track the
/// URL cache's effectiveness per `spec.md` §4.2. Kept process-wide, as
/// `spec.md` §5 allows.
#[derive(Debug, Default)]
pub struct HitMissCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitMissCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_independently() {
        let c = HitMissCounters::new();
        c.record_hit();
        c.record_hit();
        c.record_miss();
        assert_eq!(c.hits(), 2);
        assert_eq!(c.misses(), 1);
    }
}
