// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use khora_core::asset::Stage;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of a storage. Updated with relaxed atomics on every path.
#[derive(Debug, Default)]
pub(crate) struct StorageMetrics {
    binds: AtomicU64,
    misses: AtomicU64,
    releases: AtomicU64,
    resets: AtomicU64,
    producer_runs: [AtomicU64; 4],
    producer_failures: [AtomicU64; 4],
    followers: [AtomicU64; 4],
}

/// A snapshot of a storage's counters.
///
/// Per-stage arrays are indexed by [`Stage::index`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Calls to `bind`, including misses.
    pub binds: u64,
    /// Binds whose resource the provider did not know.
    pub misses: u64,
    /// Handles dropped.
    pub releases: u64,
    /// Entries reset after their last handle was dropped.
    pub resets: u64,
    /// Producer invocations per stage.
    pub producer_runs: [u64; 4],
    /// Producer invocations that failed, per stage.
    pub producer_failures: [u64; 4],
    /// Requests that joined a pending escalation instead of producing, per stage.
    pub followers: [u64; 4],
}

impl StorageStats {
    /// Producer invocations for `stage`.
    pub fn runs(&self, stage: Stage) -> u64 {
        self.producer_runs[stage.index()]
    }

    /// Failed producer invocations for `stage`.
    pub fn failures(&self, stage: Stage) -> u64 {
        self.producer_failures[stage.index()]
    }

    /// Followers of `stage`.
    pub fn followers(&self, stage: Stage) -> u64 {
        self.followers[stage.index()]
    }
}

impl StorageMetrics {
    pub(crate) fn record_bind(&self) {
        self.binds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_run(&self, stage: Stage) {
        self.producer_runs[stage.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, stage: Stage) {
        self.producer_failures[stage.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_follower(&self, stage: Stage) {
        self.followers[stage.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StorageStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StorageStats {
            binds: load(&self.binds),
            misses: load(&self.misses),
            releases: load(&self.releases),
            resets: load(&self.resets),
            producer_runs: self.producer_runs.each_ref().map(load),
            producer_failures: self.producer_failures.each_ref().map(load),
            followers: self.followers.each_ref().map(load),
        }
    }
}
