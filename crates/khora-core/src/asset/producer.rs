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

//! The per-category collaborators that escalate an asset, and the context
//! they receive.

use super::{AssetName, AssetState, CategoryId, ResourceHandle, ResourceMetadata};
use anyhow::Result;
use bytes::{Bytes, BytesMut};

/// Allocation function a category routes producer buffers through.
pub trait BufferAllocator: Send + Sync {
    /// Returns an empty buffer with at least `capacity` bytes reserved.
    fn allocate(&self, capacity: usize) -> BytesMut;
}

/// Everything a producer may look at while escalating one asset.
///
/// The context is scoped to a single producer invocation: it borrows the
/// entry's current data and metadata and cannot outlive the call.
pub struct ProducerContext<'a> {
    name: &'a AssetName,
    category: &'a CategoryId,
    target: AssetState,
    data: &'a Bytes,
    metadata: &'a ResourceMetadata,
    allocator: &'a dyn BufferAllocator,
}

impl<'a> ProducerContext<'a> {
    /// Assembles a context for producing `target`.
    pub fn new(
        name: &'a AssetName,
        category: &'a CategoryId,
        target: AssetState,
        data: &'a Bytes,
        metadata: &'a ResourceMetadata,
        allocator: &'a dyn BufferAllocator,
    ) -> Self {
        Self {
            name,
            category,
            target,
            data,
            metadata,
            allocator,
        }
    }

    /// The asset being escalated.
    pub fn name(&self) -> &AssetName {
        self.name
    }

    /// The asset's category.
    pub fn category(&self) -> &CategoryId {
        self.category
    }

    /// The state this invocation must produce.
    pub fn target(&self) -> AssetState {
        self.target
    }

    /// The bytes of the stage below the target.
    pub fn data(&self) -> &Bytes {
        self.data
    }

    /// The metadata decoded by the Raw stage.
    pub fn metadata(&self) -> &ResourceMetadata {
        self.metadata
    }

    /// Allocates an output buffer through the category's allocator.
    pub fn allocate(&self, capacity: usize) -> BytesMut {
        self.allocator.allocate(capacity)
    }
}

/// One input unit of a compilation (the main file, an include, a mip...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// A name for diagnostics.
    pub name: String,
    /// The unit's bytes.
    pub bytes: Bytes,
}

/// The intermediate result of compiling one [`SourceUnit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSource {
    /// The name of the unit it was compiled from.
    pub name: String,
    /// The compiled bytes.
    pub bytes: Bytes,
}

/// Turns raw bytes into the baked form of a category (shader transpilation,
/// image encoding, font atlas generation...).
///
/// Only the producer of a Baked escalation calls a compiler, and it calls the
/// steps in declaration order. Any step returning an error fails the
/// escalation for every waiter.
pub trait AssetCompiler: Send + Sync {
    /// Rejects input the compiler cannot handle.
    fn validate_source(&self, ctx: &ProducerContext<'_>) -> Result<()>;

    /// Splits the input into compilation units.
    fn collect_sources(&self, ctx: &ProducerContext<'_>) -> Result<Vec<SourceUnit>> {
        Ok(vec![SourceUnit {
            name: ctx.name().to_string(),
            bytes: ctx.data().clone(),
        }])
    }

    /// Lists the other assets the compiled result depends on.
    fn collect_dependencies(&self, _ctx: &ProducerContext<'_>) -> Result<Vec<AssetName>> {
        Ok(Vec::new())
    }

    /// Compiles one unit.
    fn compile_source(&self, ctx: &ProducerContext<'_>, source: &SourceUnit)
        -> Result<CompiledSource>;

    /// Merges the compiled units into the baked buffer.
    fn finalize(&self, ctx: &ProducerContext<'_>, compiled: Vec<CompiledSource>) -> Result<Bytes>;
}

/// Turns a baked buffer into the loaded form of a category.
pub trait AssetLoader: Send + Sync {
    /// Produces the loaded bytes from `ctx.data()` and `ctx.metadata()`.
    fn load(&self, ctx: &ProducerContext<'_>) -> Result<Bytes>;
}

/// Materializes the final runtime object from the loaded form.
pub trait RuntimeHook: Send + Sync {
    /// Produces the runtime bytes from `ctx.data()`.
    fn materialize(&self, ctx: &ProducerContext<'_>) -> Result<Bytes>;
}

/// Computes how far a resource already is when it is fetched.
pub trait StateClassifier: Send + Sync {
    /// Returns the resource's inherent achievable state.
    ///
    /// The Raw stage clamps the answer to `Raw..=Loaded`.
    fn classify(&self, metadata: &ResourceMetadata, resource: &ResourceHandle) -> AssetState;
}

/// The default classifier: trusts [`ResourceMetadata::inherent_state`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataClassifier;

impl StateClassifier for MetadataClassifier {
    fn classify(&self, metadata: &ResourceMetadata, _resource: &ResourceHandle) -> AssetState {
        metadata.inherent_state.unwrap_or(AssetState::Raw)
    }
}

impl<F> AssetLoader for F
where
    F: Fn(&ProducerContext<'_>) -> Result<Bytes> + Send + Sync,
{
    fn load(&self, ctx: &ProducerContext<'_>) -> Result<Bytes> {
        self(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PlainAllocator;

    impl BufferAllocator for PlainAllocator {
        fn allocate(&self, capacity: usize) -> BytesMut {
            BytesMut::with_capacity(capacity)
        }
    }

    #[test]
    fn test_context_exposes_inputs() {
        let name = AssetName::new("fonts/mono.ttf");
        let category = CategoryId::new("font");
        let data = Bytes::from_static(b"glyphs");
        let metadata = ResourceMetadata::default();
        let ctx = ProducerContext::new(
            &name,
            &category,
            AssetState::Baked,
            &data,
            &metadata,
            &PlainAllocator,
        );

        assert_eq!(ctx.name().as_str(), "fonts/mono.ttf");
        assert_eq!(ctx.category().as_str(), "font");
        assert_eq!(ctx.target(), AssetState::Baked);
        assert_eq!(ctx.data().as_ref(), b"glyphs");
        assert!(ctx.allocate(64).capacity() >= 64);
    }

    #[test]
    fn test_metadata_classifier_defaults_to_raw() {
        let resource = ResourceHandle::new("a");
        let mut metadata = ResourceMetadata::default();
        assert_eq!(
            MetadataClassifier.classify(&metadata, &resource),
            AssetState::Raw
        );
        metadata.inherent_state = Some(AssetState::Baked);
        assert_eq!(
            MetadataClassifier.classify(&metadata, &resource),
            AssetState::Baked
        );
    }
}
