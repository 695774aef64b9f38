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

use ahash::AHashSet;
use anyhow::{Context, Result};
use async_trait::async_trait;
use khora_core::asset::{LoadedResource, ResourceHandle, ResourceProvider};
use std::{
    ffi::OsString,
    path::{Component, Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Extension of the optional side-car file holding a resource's metadata.
pub const METADATA_EXTENSION: &str = "meta";

/// A provider serving the files under a root directory.
///
/// URIs are paths relative to the root, using `/` as separator. A resource
/// `textures/brick.png` may come with `textures/brick.png.meta`, read as its
/// `bincode`-encoded metadata. URIs that are absolute or climb out of the root
/// resolve to nothing.
#[derive(Debug)]
pub struct DirectoryProvider {
    root: PathBuf,
    loaded: Mutex<AHashSet<String>>,
}

impl DirectoryProvider {
    /// Serves the files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loaded: Mutex::new(AHashSet::new()),
        }
    }

    /// The directory resources are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `uri` was loaded and not unloaded since.
    pub fn is_loaded(&self, uri: &str) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(uri)
    }

    fn path_of(&self, uri: &str) -> Option<PathBuf> {
        let relative = Path::new(uri);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        (contained && !uri.is_empty()).then(|| self.root.join(relative))
    }
}

fn metadata_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(METADATA_EXTENSION);
    PathBuf::from(name)
}

#[async_trait]
impl ResourceProvider for DirectoryProvider {
    fn resolve(&self, uri: &str) -> Option<ResourceHandle> {
        self.path_of(uri)
            .filter(|path| path.is_file())
            .map(|_| ResourceHandle::new(uri))
    }

    async fn load(&self, resource: &ResourceHandle) -> Result<LoadedResource> {
        let path = self
            .path_of(resource.uri())
            .with_context(|| format!("'{}' is outside of {}", resource, self.root.display()))?;

        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut loaded = LoadedResource::new(bytes);

        let meta = metadata_path(&path);
        if tokio::fs::try_exists(&meta).await.unwrap_or(false) {
            let metadata = tokio::fs::read(&meta)
                .await
                .with_context(|| format!("failed to read {}", meta.display()))?;
            loaded = loaded.with_metadata(metadata);
        }

        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.uri().to_string());
        Ok(loaded)
    }

    fn unload(&self, resource: &ResourceHandle) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(resource.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_uris_cannot_escape_the_root() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("inside.txt"), "ok").unwrap();
        let provider = DirectoryProvider::new(dir.path().join("sub"));
        std::fs::create_dir(provider.root()).unwrap();

        assert!(provider.resolve("../inside.txt").is_none());
        assert!(provider.resolve("").is_none());
        assert!(provider
            .resolve(dir.path().join("inside.txt").to_str().unwrap())
            .is_none());
    }

    #[test]
    fn test_metadata_path_appends_the_extension() {
        assert_eq!(
            metadata_path(Path::new("textures/brick.png")),
            PathBuf::from("textures/brick.png.meta")
        );
    }

    #[tokio::test]
    async fn test_load_then_unload() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shaders")).unwrap();
        std::fs::write(dir.path().join("shaders/lit.wgsl"), "fn main() {}").unwrap();
        let provider = DirectoryProvider::new(dir.path());

        let handle = provider.resolve("shaders/lit.wgsl").expect("file exists");
        assert!(provider.resolve("shaders").is_none(), "directories are not resources");

        let loaded = provider.load(&handle).await.unwrap();
        assert_eq!(loaded.bytes, "fn main() {}");
        assert!(loaded.metadata.is_none());
        assert!(provider.is_loaded("shaders/lit.wgsl"));

        assert!(provider.unload(&handle));
        assert!(!provider.unload(&handle));
    }
}
