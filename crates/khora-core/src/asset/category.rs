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

use super::{
    AssetCompiler, AssetLoader, CategoryId, MetadataClassifier, RuntimeHook, StateClassifier,
};
use std::{fmt, sync::Arc};

/// The function table a category is registered with.
///
/// A loader is mandatory. Without a compiler the Baked stage passes the raw
/// bytes through; without a runtime hook the Runtime stage passes the loaded
/// bytes through.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use khora_core::asset::{CategoryDefinition, ProducerContext};
///
/// let textures = CategoryDefinition::new(
///     "texture",
///     |ctx: &ProducerContext<'_>| -> anyhow::Result<Bytes> { Ok(ctx.data().clone()) },
/// );
/// assert_eq!(textures.id().as_str(), "texture");
/// assert!(textures.compiler().is_none());
/// ```
#[derive(Clone)]
pub struct CategoryDefinition {
    id: CategoryId,
    compiler: Option<Arc<dyn AssetCompiler>>,
    loader: Arc<dyn AssetLoader>,
    runtime_hook: Option<Arc<dyn RuntimeHook>>,
    classifier: Arc<dyn StateClassifier>,
}

impl CategoryDefinition {
    /// Creates a category with its loader and the default classifier.
    pub fn new(id: impl Into<CategoryId>, loader: impl AssetLoader + 'static) -> Self {
        Self {
            id: id.into(),
            compiler: None,
            loader: Arc::new(loader),
            runtime_hook: None,
            classifier: Arc::new(MetadataClassifier),
        }
    }

    /// Binds the compiler used by the Baked stage.
    pub fn with_compiler(mut self, compiler: impl AssetCompiler + 'static) -> Self {
        self.compiler = Some(Arc::new(compiler));
        self
    }

    /// Binds the hook used by the Runtime stage.
    pub fn with_runtime_hook(mut self, hook: impl RuntimeHook + 'static) -> Self {
        self.runtime_hook = Some(Arc::new(hook));
        self
    }

    /// Replaces the classifier used by the Raw stage.
    pub fn with_classifier(mut self, classifier: impl StateClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// The category's id.
    pub fn id(&self) -> &CategoryId {
        &self.id
    }

    /// The compiler, if the category has one.
    pub fn compiler(&self) -> Option<&dyn AssetCompiler> {
        self.compiler.as_deref()
    }

    /// The loader.
    pub fn loader(&self) -> &dyn AssetLoader {
        self.loader.as_ref()
    }

    /// The runtime hook, if the category has one.
    pub fn runtime_hook(&self) -> Option<&dyn RuntimeHook> {
        self.runtime_hook.as_deref()
    }

    /// The classifier.
    pub fn classifier(&self) -> &dyn StateClassifier {
        self.classifier.as_ref()
    }
}

impl fmt::Debug for CategoryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryDefinition")
            .field("id", &self.id)
            .field("compiler", &self.compiler.is_some())
            .field("runtime_hook", &self.runtime_hook.is_some())
            .finish_non_exhaustive()
    }
}
