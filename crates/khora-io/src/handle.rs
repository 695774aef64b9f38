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

//! The reference-counted handle callers hold on cached assets.

use crate::storage::{CategoryShelve, Storage, StorageShared};
use bytes::Bytes;
use khora_core::asset::{
    AssetError, AssetName, AssetResult, AssetState, CategoryId, ResourceMetadata,
};
use khora_data::assets::Entry;
use std::{
    fmt,
    sync::{Arc, Weak},
};

struct Binding {
    entry: Arc<Entry>,
    shelve: Arc<CategoryShelve>,
    storage: Weak<StorageShared>,
    /// Internal pins are not handles and stay out of the release counter.
    counted: bool,
}

/// A handle on a bound asset name, or an empty handle when the name had no
/// backing resource.
///
/// Every clone counts as a reference on the shared entry. When the last one
/// is dropped the entry releases all of its buffers and returns to
/// [`AssetState::Unknown`].
pub struct Asset {
    binding: Option<Binding>,
}

impl Asset {
    /// A handle bound to nothing.
    pub const fn empty() -> Self {
        Self { binding: None }
    }

    /// Wraps an entry the caller already acquired a reference on.
    pub(crate) fn bound(
        entry: Arc<Entry>,
        shelve: Arc<CategoryShelve>,
        storage: Weak<StorageShared>,
    ) -> Self {
        Self {
            binding: Some(Binding {
                entry,
                shelve,
                storage,
                counted: true,
            }),
        }
    }

    /// Takes an extra reference on the entry for the cache's own use.
    pub(crate) fn pin(&self) -> Self {
        let mut pin = self.clone();
        if let Some(binding) = &mut pin.binding {
            binding.counted = false;
        }
        pin
    }

    /// The entry and the registry it lives in, captured at bind time.
    pub(crate) fn binding(&self) -> Option<(&Arc<Entry>, &Arc<CategoryShelve>)> {
        self.binding
            .as_ref()
            .map(|binding| (&binding.entry, &binding.shelve))
    }

    /// Whether the handle is empty.
    pub fn is_empty(&self) -> bool {
        self.binding.is_none()
    }

    /// The shared entry behind the handle.
    pub fn entry(&self) -> Option<&Arc<Entry>> {
        self.binding.as_ref().map(|binding| &binding.entry)
    }

    /// The bound name.
    pub fn name(&self) -> Option<&AssetName> {
        self.entry().map(|entry| entry.name())
    }

    /// The category the name was bound in.
    pub fn category(&self) -> Option<&CategoryId> {
        self.entry().map(|entry| entry.category())
    }

    /// The entry's current state, or `Invalid` for an empty handle.
    pub fn state(&self) -> AssetState {
        self.entry()
            .map_or(AssetState::Invalid, |entry| entry.current_state())
    }

    /// The bytes backing `state`, if the entry currently satisfies it. Never escalates.
    pub fn data(&self, state: AssetState) -> Option<Bytes> {
        self.entry()?.data_for_state(state)
    }

    /// The assets the compiler reported this one depends on.
    pub fn dependencies(&self) -> Vec<AssetName> {
        self.entry()
            .map(|entry| entry.dependencies())
            .unwrap_or_default()
    }

    /// The resource metadata, once the Raw stage ran.
    pub fn metadata(&self) -> Option<Arc<ResourceMetadata>> {
        self.entry()?.metadata()
    }

    /// Escalates the asset to `state`. See [`Storage::request`].
    pub async fn request(&self, state: AssetState) -> AssetResult<Bytes> {
        let binding = self.binding.as_ref().ok_or(AssetError::EmptyHandle)?;
        let shared = binding
            .storage
            .upgrade()
            .ok_or(AssetError::StorageDropped)?;
        let storage = Storage::from_shared(shared);
        storage.request(self, state).await
    }
}

impl Default for Asset {
    fn default() -> Self {
        Self::empty()
    }
}

impl Clone for Asset {
    fn clone(&self) -> Self {
        match &self.binding {
            Some(binding) => {
                // We hold a reference: the entry cannot be resetting.
                binding.entry.acquire(0);
                Self::bound(
                    binding.entry.clone(),
                    binding.shelve.clone(),
                    binding.storage.clone(),
                )
            }
            None => Self::empty(),
        }
    }
}

impl Drop for Asset {
    fn drop(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        let storage = binding.storage.upgrade();
        if binding.counted {
            if let Some(storage) = &storage {
                storage.metrics.record_release();
            }
        }
        if !binding.entry.release() {
            return;
        }
        log::debug!("Last handle on '{}' released", binding.entry.name());
        match storage {
            Some(storage) => storage.reset(&binding.entry),
            None => binding.entry.finish_reset(),
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry() {
            Some(entry) => f
                .debug_struct("Asset")
                .field("name", entry.name())
                .field("category", entry.category())
                .field("state", &entry.current_state())
                .finish(),
            None => f.write_str("Asset(empty)"),
        }
    }
}
