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

//! The storage orchestrator: binds names to entries and drives escalations.
//!
//! An asset goes through up to four stages, each run by a different
//! collaborator of its category:
//!
//! | Stage   | Collaborator                         | Without one           |
//! |---------|--------------------------------------|-----------------------|
//! | Raw     | [`ResourceProvider::load`]           | (always present)      |
//! | Baked   | [`AssetCompiler`](khora_core::asset::AssetCompiler) | raw bytes pass through |
//! | Loaded  | [`AssetLoader`](khora_core::asset::AssetLoader)     | (mandatory)           |
//! | Runtime | [`RuntimeHook`](khora_core::asset::RuntimeHook)     | loaded bytes pass through |
//!
//! Requesting a state runs every unmet stage below it in order, each exactly
//! once per entry no matter how many callers ask concurrently.

mod config;
mod metrics;
mod request;

pub use config::*;
pub use metrics::StorageStats;

use crate::handle::Asset;
use bytes::Bytes;
use khora_core::asset::{
    AssetError, AssetName, AssetResult, AssetState, CategoryDefinition, CategoryId,
    ReleaseResolver, ResourceProvider, Stage,
};
use khora_data::{
    allocators::AllocationStats,
    assets::{Entry, Shelve},
};
use ahash::AHashMap;
use metrics::StorageMetrics;
use request::{drain_stage, Request, Transaction};
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

pub(crate) type CategoryShelve = Shelve<Arc<Transaction>>;

/// State shared by a [`Storage`], its handles and its pending transactions.
pub(crate) struct StorageShared {
    pub(crate) config: StorageConfig,
    pub(crate) provider: Arc<dyn ResourceProvider>,
    pub(crate) metrics: StorageMetrics,
    shelves: RwLock<AHashMap<CategoryId, Arc<CategoryShelve>>>,
    resolver: RwLock<Option<Arc<dyn ReleaseResolver>>>,
}

impl StorageShared {
    fn shelve(&self, category: &str) -> AssetResult<Arc<CategoryShelve>> {
        self.shelves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(category)
            .cloned()
            .ok_or_else(|| AssetError::UnknownCategory(CategoryId::new(category)))
    }

    fn shelves(&self) -> Vec<Arc<CategoryShelve>> {
        self.shelves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Runs the release side effects of an entry whose last handle was dropped,
    /// then reopens it. Called by the handle that observed the zero transition.
    pub(crate) fn reset(&self, entry: &Entry) {
        let resolver = self
            .resolver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(resolver) = resolver {
            resolver.on_release(entry.name(), entry.category(), entry.resource());
        }
        if self.provider.unload(entry.resource()) {
            log::trace!("Provider unloaded {}", entry.resource());
        }
        entry.finish_reset();
        self.metrics.record_reset();
    }
}

impl Drop for StorageShared {
    fn drop(&mut self) {
        // Queued transactions pin their shelve; dropping them abandons the
        // escalations nobody will run anymore.
        let shelves = self.shelves.get_mut().unwrap_or_else(PoisonError::into_inner);
        for shelve in shelves.values() {
            for stage in Stage::ALL {
                while let Some(transaction) = shelve.acquire_request(stage) {
                    drop(transaction);
                }
            }
        }
    }
}

/// The asset content cache.
///
/// A `Storage` is cheap to clone; clones share the same registries. Handles
/// keep only a weak reference to it: once every `Storage` clone is dropped,
/// requests through surviving handles fail with [`AssetError::StorageDropped`].
///
/// # Examples
///
/// ```
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use bytes::Bytes;
/// use khora_core::asset::{AssetState, CategoryDefinition, ProducerContext};
/// use khora_io::{provider::MemoryProvider, Storage};
///
/// let provider = MemoryProvider::new();
/// provider.insert_bytes("greeting.txt", "hello");
///
/// let storage = Storage::new(provider);
/// storage
///     .register_category(CategoryDefinition::new(
///         "text",
///         |ctx: &ProducerContext<'_>| -> anyhow::Result<Bytes> {
///             Ok(Bytes::from(ctx.data().to_ascii_uppercase()))
///         },
///     ))
///     .unwrap();
///
/// let greeting = storage.bind("text", "greeting.txt").unwrap();
/// let loaded = greeting.request(AssetState::Loaded).await.unwrap();
/// assert_eq!(loaded, "HELLO");
/// # });
/// ```
#[derive(Clone)]
pub struct Storage {
    shared: Arc<StorageShared>,
}

impl Storage {
    /// Creates a storage over `provider` with the default config.
    pub fn new(provider: impl ResourceProvider + 'static) -> Self {
        Self::with_config(provider, StorageConfig::default())
    }

    /// Creates a storage over `provider`.
    pub fn with_config(provider: impl ResourceProvider + 'static, config: StorageConfig) -> Self {
        log::debug!("Storage: created with {:?}", config);
        Self {
            shared: Arc::new(StorageShared {
                config,
                provider: Arc::new(provider),
                metrics: StorageMetrics::default(),
                shelves: RwLock::new(AHashMap::new()),
                resolver: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<StorageShared>) -> Self {
        Self { shared }
    }

    /// The storage's settings.
    pub fn config(&self) -> &StorageConfig {
        &self.shared.config
    }

    /// Registers a category and its collaborators.
    pub fn register_category(&self, definition: CategoryDefinition) -> AssetResult<()> {
        let mut shelves = self
            .shared
            .shelves
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = definition.id().clone();
        if shelves.contains_key(&id) {
            return Err(AssetError::DuplicateCategory(id));
        }
        log::info!("Storage: registered asset category '{}'", id);
        shelves.insert(id, Arc::new(Shelve::new(definition)));
        Ok(())
    }

    /// The ids of every registered category.
    pub fn categories(&self) -> Vec<CategoryId> {
        self.shared
            .shelves()
            .iter()
            .map(|shelve| shelve.id().clone())
            .collect()
    }

    /// Installs the callback notified whenever an entry's last handle is dropped.
    pub fn set_release_resolver(&self, resolver: impl ReleaseResolver + 'static) {
        *self
            .shared
            .resolver
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(resolver));
    }

    /// Binds `name` in `category` and returns a handle to its entry.
    ///
    /// Returns an empty handle, not an error, when the provider does not know
    /// the resource. Binding a name whose entry is resetting waits for the
    /// reset to finish, then reuses the slot.
    pub fn bind(&self, category: &str, name: &str) -> AssetResult<Asset> {
        let shared = &self.shared;
        let shelve = shared.shelve(category)?;
        shared.metrics.record_bind();

        let (entry, fresh) = match shelve.select(name) {
            Some(entry) => (entry, false),
            None => match shared.provider.resolve(name) {
                Some(resource) => (shelve.store(AssetName::new(name), resource), true),
                None => return Ok(self.miss(category, name)),
            },
        };

        // A dormant or resetting slot: the resource may have gone since.
        if !fresh
            && (entry.is_resetting() || entry.current_state() == AssetState::Unknown)
            && shared.provider.resolve(name).is_none()
        {
            return Ok(self.miss(category, name));
        }

        entry.acquire(shared.config.reset_spin_limit);
        let asset = Asset::bound(entry.clone(), shelve, Arc::downgrade(shared));

        entry.mark_exists();
        log::trace!(
            "Bound '{}' in '{}' (refs: {})",
            name,
            category,
            entry.ref_count()
        );
        Ok(asset)
    }

    fn miss(&self, category: &str, name: &str) -> Asset {
        log::debug!("Storage: no resource behind '{}' in '{}'", name, category);
        self.shared.metrics.record_miss();
        Asset::empty()
    }

    /// Escalates `asset` to `state` and returns the bytes backing that state.
    ///
    /// Every stage from Raw up to `state` that the entry has not reached yet is
    /// escalated in order. A stage that failed for this entry keeps failing
    /// until the entry is reset. A stage whose producer was abandoned, for
    /// instance because the caller running it was cancelled, is elected again.
    ///
    /// Requesting `Raw` on a resource that started above it returns the
    /// lowest representation the entry holds.
    pub async fn request(&self, asset: &Asset, state: AssetState) -> AssetResult<Bytes> {
        let target = Stage::try_from(state)?;
        let (entry, shelve) = asset.binding().ok_or(AssetError::EmptyHandle)?;

        for stage in target.up_to() {
            loop {
                if entry.reached(stage) {
                    break;
                }
                if !entry.clear_abandoned(stage) {
                    if let Some(error) = entry.failure(stage) {
                        return Err(error);
                    }
                }
                match Request::new(&self.shared, asset, entry, shelve, stage)
                    .wait()
                    .await
                {
                    Ok(_) => break,
                    // Whoever was producing went away; elect again.
                    Err(AssetError::Abandoned { .. }) => {
                        log::debug!("Retrying {} escalation of '{}'", stage, entry.name());
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        entry
            .payload_for(target)
            .ok_or_else(|| AssetError::Released(entry.name().clone()))
    }

    /// Drops a handle. The entry resets once its last handle is gone.
    pub fn release(&self, asset: Asset) {
        drop(asset);
    }

    /// Runs every queued escalation of every category.
    ///
    /// This is how work gets done under [`DispatchMode::External`]; under
    /// `Inline` it only helps the waiting requests along. Returns how many
    /// escalations ran.
    pub async fn pump(&self) -> usize {
        let mut ran = 0;
        for shelve in self.shared.shelves() {
            for stage in Stage::ALL {
                ran += drain_stage(&shelve, stage).await;
            }
        }
        if ran > 0 {
            log::trace!("Storage: pumped {} escalation(s)", ran);
        }
        ran
    }

    /// Whether any escalation is queued and waiting to be run.
    pub fn has_pending_work(&self) -> bool {
        self.shared
            .shelves()
            .iter()
            .any(|shelve| Stage::ALL.into_iter().any(|stage| shelve.has_pending(stage)))
    }

    /// A snapshot of the storage's counters.
    pub fn stats(&self) -> StorageStats {
        self.shared.metrics.snapshot()
    }

    /// The allocation counters of a category's producers.
    pub fn allocation_stats(&self, category: &str) -> AssetResult<AllocationStats> {
        Ok(self.shared.shelve(category)?.allocator().stats())
    }

    /// Number of entries of a category currently referenced by a handle.
    pub fn live_entries(&self, category: &str) -> AssetResult<usize> {
        Ok(self.shared.shelve(category)?.live_entries())
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("config", &self.shared.config)
            .field("categories", &self.categories())
            .finish_non_exhaustive()
    }
}
