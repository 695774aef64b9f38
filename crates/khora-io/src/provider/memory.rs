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

use ahash::AHashMap;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use khora_core::asset::{LoadedResource, ResourceHandle, ResourceProvider};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError, RwLock,
    },
    time::Duration,
};

/// A provider serving resources from memory.
///
/// Useful for tools and tests: resources can be added and removed at any
/// time, an artificial latency can be configured to make loads overlap, and
/// every load and unload is counted.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    resources: RwLock<AHashMap<String, LoadedResource>>,
    loads: Mutex<AHashMap<String, usize>>,
    unloads: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every load by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds or replaces a resource.
    pub fn insert(&self, uri: impl Into<String>, resource: LoadedResource) {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into(), resource);
    }

    /// Adds or replaces a resource that has no metadata.
    pub fn insert_bytes(&self, uri: impl Into<String>, bytes: impl Into<Bytes>) {
        self.insert(uri, LoadedResource::new(bytes));
    }

    /// Removes a resource. Entries already bound to it keep their buffers.
    pub fn remove(&self, uri: &str) -> Option<LoadedResource> {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
    }

    /// How many times `uri` was loaded.
    pub fn load_count(&self, uri: &str) -> usize {
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .copied()
            .unwrap_or(0)
    }

    /// How many unload notifications were received.
    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    fn resolve(&self, uri: &str) -> Option<ResourceHandle> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(uri)
            .then(|| ResourceHandle::new(uri))
    }

    async fn load(&self, resource: &ResourceHandle) -> Result<LoadedResource> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        *self
            .loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(resource.uri().to_string())
            .or_insert(0) += 1;

        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource.uri())
            .cloned()
            .ok_or_else(|| anyhow!("resource '{}' was removed", resource.uri()))
    }

    fn unload(&self, _resource: &ResourceHandle) -> bool {
        self.unloads.fetch_add(1, Ordering::Relaxed);
        true
    }
}
