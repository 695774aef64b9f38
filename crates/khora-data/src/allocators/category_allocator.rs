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

//! A per-category buffer allocator that keeps allocation statistics.

use bytes::BytesMut;
use khora_core::asset::BufferAllocator;
use std::sync::atomic::{AtomicU64, Ordering};

/// The size, in bytes, at or above which a buffer is considered "large".
const LARGE_ALLOCATION_THRESHOLD: usize = 1024 * 1024; // 1MB

/// Routes producer buffers of one category through counted allocations.
///
/// Every escalation of the category allocates its output through
/// [`ProducerContext::allocate`](khora_core::asset::ProducerContext::allocate),
/// so these counters show how much memory each category's producers ask for.
#[derive(Debug, Default)]
pub struct CategoryAllocator {
    allocations: AtomicU64,
    bytes_reserved: AtomicU64,
    large_allocations: AtomicU64,
    peak_allocation: AtomicU64,
}

/// A snapshot of a [`CategoryAllocator`]'s counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    /// Number of buffers handed out.
    pub allocations: u64,
    /// Cumulative capacity reserved across all buffers.
    pub bytes_reserved: u64,
    /// Number of buffers at or above the large threshold.
    pub large_allocations: u64,
    /// The largest single reservation.
    pub peak_allocation: u64,
}

impl CategoryAllocator {
    /// Creates an allocator with zeroed counters.
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            bytes_reserved: AtomicU64::new(0),
            large_allocations: AtomicU64::new(0),
            peak_allocation: AtomicU64::new(0),
        }
    }

    /// Reads all counters (`Ordering::Relaxed`).
    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            bytes_reserved: self.bytes_reserved.load(Ordering::Relaxed),
            large_allocations: self.large_allocations.load(Ordering::Relaxed),
            peak_allocation: self.peak_allocation.load(Ordering::Relaxed),
        }
    }
}

impl BufferAllocator for CategoryAllocator {
    fn allocate(&self, capacity: usize) -> BytesMut {
        let size = capacity as u64;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_reserved.fetch_add(size, Ordering::Relaxed);
        self.peak_allocation.fetch_max(size, Ordering::Relaxed);
        if capacity >= LARGE_ALLOCATION_THRESHOLD {
            self.large_allocations.fetch_add(1, Ordering::Relaxed);
        }
        BytesMut::with_capacity(capacity)
    }
}
