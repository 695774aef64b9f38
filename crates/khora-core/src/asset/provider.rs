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

//! The byte-level boundary of the cache.

use super::{AssetName, CategoryId, ResourceHandle};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// What a provider returns when it loads a resource.
#[derive(Debug, Clone, Default)]
pub struct LoadedResource {
    /// The resource's stored bytes.
    pub bytes: Bytes,
    /// Optional `bincode`-encoded [`ResourceMetadata`](super::ResourceMetadata).
    pub metadata: Option<Bytes>,
}

impl LoadedResource {
    /// A resource with bytes and no metadata.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            metadata: None,
        }
    }

    /// Attaches encoded metadata.
    pub fn with_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Supplies the bytes behind asset names.
///
/// The cache never touches storage itself: existence checks happen at bind
/// time through [`resolve`](ResourceProvider::resolve), bytes are fetched by
/// the Raw stage through [`load`](ResourceProvider::load), and the last
/// release of an entry calls [`unload`](ResourceProvider::unload).
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Confirms that `uri` exists and returns its identity.
    fn resolve(&self, uri: &str) -> Option<ResourceHandle>;

    /// Fetches the stored bytes and metadata of a resolved resource.
    async fn load(&self, resource: &ResourceHandle) -> anyhow::Result<LoadedResource>;

    /// Lets the provider drop whatever it holds for the resource.
    ///
    /// Returns `true` if something was actually unloaded.
    fn unload(&self, resource: &ResourceHandle) -> bool;
}

#[async_trait]
impl<P: ResourceProvider + ?Sized> ResourceProvider for Arc<P> {
    fn resolve(&self, uri: &str) -> Option<ResourceHandle> {
        (**self).resolve(uri)
    }

    async fn load(&self, resource: &ResourceHandle) -> anyhow::Result<LoadedResource> {
        (**self).load(resource).await
    }

    fn unload(&self, resource: &ResourceHandle) -> bool {
        (**self).unload(resource)
    }
}

/// Notified when an entry's last handle is released, before it resets.
pub trait ReleaseResolver: Send + Sync {
    /// Called once per refcount-zero transition.
    fn on_release(&self, name: &AssetName, category: &CategoryId, resource: &ResourceHandle);
}

impl<F> ReleaseResolver for F
where
    F: Fn(&AssetName, &CategoryId, &ResourceHandle) + Send + Sync,
{
    fn on_release(&self, name: &AssetName, category: &CategoryId, resource: &ResourceHandle) {
        self(name, category, resource)
    }
}
