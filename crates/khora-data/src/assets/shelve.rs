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

//! The per-category registry of entries and pending escalations.

use super::Entry;
use crate::{allocators::CategoryAllocator, sync::WorkQueue};
use ahash::AHashMap;
use khora_core::asset::{AssetName, CategoryDefinition, CategoryId, ResourceHandle, Stage};
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Everything the cache keeps for one category.
///
/// A shelve owns the category's collaborators, the entries bound under it and
/// one work queue per escalation stage. Entries are never removed: a released
/// entry resets in place and its slot is reused by the next bind of the same
/// name.
///
/// `R` is the type of the queued work items; the storage layer decides what
/// a pending escalation looks like.
pub struct Shelve<R> {
    definition: CategoryDefinition,
    entries: RwLock<AHashMap<AssetName, Arc<Entry>>>,
    queues: [WorkQueue<R>; 4],
    allocator: CategoryAllocator,
}

impl<R> Shelve<R> {
    /// Creates an empty shelve for a category.
    pub fn new(definition: CategoryDefinition) -> Self {
        Self {
            definition,
            entries: RwLock::new(AHashMap::new()),
            queues: std::array::from_fn(|_| WorkQueue::new()),
            allocator: CategoryAllocator::new(),
        }
    }

    /// The category this shelve serves.
    pub fn id(&self) -> &CategoryId {
        self.definition.id()
    }

    /// The category's collaborators.
    pub fn definition(&self) -> &CategoryDefinition {
        &self.definition
    }

    /// The allocator every producer of the category allocates through.
    pub fn allocator(&self) -> &CategoryAllocator {
        &self.allocator
    }

    /// Looks up the entry of `name`.
    pub fn select(&self, name: &str) -> Option<Arc<Entry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Inserts a fresh entry for `name`.
    ///
    /// If another thread stored the same name first, its entry is returned
    /// and `resource` is discarded, so a name never maps to two entries.
    pub fn store(&self, name: AssetName, resource: ResourceHandle) -> Arc<Entry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(name)
            .or_insert_with_key(|name| {
                log::trace!("New entry for '{}' in category '{}'", name, self.id());
                Arc::new(Entry::new(name.clone(), self.id().clone(), resource))
            })
            .clone()
    }

    /// Queues a pending escalation of `stage`.
    pub fn append_request(&self, stage: Stage, request: R) {
        self.queues[stage.index()].push(request);
    }

    /// Dequeues a pending escalation of `stage`, if one is visible.
    pub fn acquire_request(&self, stage: Stage) -> Option<R> {
        self.queues[stage.index()].pop()
    }

    /// Whether escalations of `stage` were queued at the time of the call.
    pub fn has_pending(&self, stage: Stage) -> bool {
        !self.queues[stage.index()].is_empty()
    }

    /// Number of entry slots, live or reset.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no name was ever bound under this category.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries currently referenced by at least one handle.
    pub fn live_entries(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.ref_count() > 0)
            .count()
    }

    /// The names of every entry slot, in no particular order.
    pub fn names(&self) -> Vec<AssetName> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl<R> fmt::Debug for Shelve<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shelve")
            .field("category", self.id())
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
