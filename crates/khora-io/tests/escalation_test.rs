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

mod common;

use bytes::Bytes;
use common::{init_logger, Counters};
use khora_core::asset::{
    AssetError, AssetName, AssetState, LoadedResource, ResourceHandle, ResourceMetadata,
    Stage, StateClassifier,
};
use khora_io::{provider::MemoryProvider, Asset, Storage};
use std::sync::Arc;

const ALL_STATES: [AssetState; 7] = [
    AssetState::Invalid,
    AssetState::Unknown,
    AssetState::Exists,
    AssetState::Raw,
    AssetState::Baked,
    AssetState::Loaded,
    AssetState::Runtime,
];

/// `data(S)` is available exactly when the current state satisfies `S`.
fn assert_data_matches_state(asset: &Asset) {
    let current = asset.state();
    for state in ALL_STATES {
        let expected = state
            .stage()
            .is_some_and(|stage| stage.is_satisfied_by(current));
        assert_eq!(
            asset.data(state).is_some(),
            expected,
            "data({state}) while the entry is {current}"
        );
    }
}

fn storage_with(provider: MemoryProvider, counters: &Counters) -> Storage {
    let storage = Storage::new(provider);
    storage
        .register_category(common::shader_category(counters))
        .unwrap();
    storage
        .register_category(common::compiled_category("texture", counters, false, None))
        .unwrap();
    storage
        .register_category(common::loader_only_category("blob", counters))
        .unwrap();
    storage
}

#[tokio::test]
async fn test_raw_then_baked_runs_the_compiler_once() {
    init_logger();
    // --- ARRANGE ---
    let provider = MemoryProvider::new();
    provider.insert_bytes("texture.png", "pixels");
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);
    let texture = storage.bind("texture", "texture.png").unwrap();
    assert_eq!(texture.state(), AssetState::Exists);

    // --- ACT & ASSERT ---
    let raw = texture.request(AssetState::Raw).await.unwrap();
    assert_eq!(raw, "pixels");
    assert_eq!(texture.state(), AssetState::Raw);
    assert_eq!(counters.compiles(), 0);

    let baked = texture.request(AssetState::Baked).await.unwrap();
    assert_eq!(baked, "compiled:pixels");
    assert_eq!(counters.compiles(), 1);

    // Already there: no second invocation.
    let again = storage.request(&texture, AssetState::Baked).await.unwrap();
    assert_eq!(again, baked);
    assert_eq!(counters.compiles(), 1);
    assert_eq!(texture.data(AssetState::Raw), None, "raw bytes are released once baked");

    let stats = storage.stats();
    assert_eq!(stats.runs(Stage::Raw), 1);
    assert_eq!(stats.runs(Stage::Baked), 1);
    assert_eq!(stats.runs(Stage::Loaded), 0);
}

#[tokio::test]
async fn test_data_follows_the_state_through_the_pipeline() {
    let provider = MemoryProvider::new();
    provider.insert_bytes("lit.wgsl", "fn main() {}");
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);
    let shader = storage.bind("shader", "lit.wgsl").unwrap();
    assert_data_matches_state(&shader);

    for state in [
        AssetState::Raw,
        AssetState::Baked,
        AssetState::Loaded,
        AssetState::Runtime,
    ] {
        let bytes = shader.request(state).await.unwrap();
        assert_eq!(shader.state(), state);
        assert_eq!(shader.data(state), Some(bytes));
        assert_data_matches_state(&shader);
    }

    assert_eq!(
        shader.data(AssetState::Runtime).unwrap(),
        "runtime:loaded:compiled:fn main() {}"
    );
    assert_eq!(counters.materializations(), 1);
}

#[tokio::test]
async fn test_requesting_a_high_state_walks_every_stage() {
    let provider = MemoryProvider::new();
    provider.insert_bytes("lit.wgsl", "#include common.wgsl\nfn main() {}");
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);
    let shader = storage.bind("shader", "lit.wgsl").unwrap();

    let runtime = shader.request(AssetState::Runtime).await.unwrap();

    assert!(runtime.starts_with(b"runtime:loaded:compiled:"));
    assert_eq!(counters.compiles(), 1);
    assert_eq!(counters.loads(), 1);
    assert_eq!(counters.materializations(), 1);
    assert_eq!(shader.dependencies(), vec![AssetName::new("common.wgsl")]);

    let allocations = storage.allocation_stats("shader").unwrap();
    assert_eq!(allocations.allocations, 2, "compiler and loader allocate once each");
}

#[tokio::test]
async fn test_compiler_failure_is_reported_and_sticky() {
    init_logger();
    let provider = MemoryProvider::new();
    provider.insert_bytes("broken.wgsl", "fn main( {}");
    let counters = Counters::default();
    let storage = Storage::new(provider);
    storage
        .register_category(common::compiled_category("shader", &counters, true, None))
        .unwrap();
    let shader = storage.bind("shader", "broken.wgsl").unwrap();

    let error = shader.request(AssetState::Loaded).await.unwrap_err();
    assert_eq!(
        error,
        AssetError::Producer {
            name: AssetName::new("broken.wgsl"),
            stage: Stage::Baked,
            reason: "failed to compile shader: unexpected token".to_string(),
        }
    );
    assert_eq!(shader.state(), AssetState::Raw);
    assert_eq!(counters.loads(), 0, "the loader never sees a failed bake");
    assert_data_matches_state(&shader);

    // The failure sticks: no second compiler invocation.
    let again = shader.request(AssetState::Baked).await.unwrap_err();
    assert_eq!(again, error);
    assert_eq!(counters.compiles(), 1);
    assert_eq!(storage.stats().failures(Stage::Baked), 1);

    // Lower stages are still served.
    assert_eq!(shader.request(AssetState::Raw).await.unwrap(), "fn main( {}");
}

#[tokio::test]
async fn test_prebaked_resource_skips_the_compiler() {
    let metadata = ResourceMetadata {
        asset_type_name: "texture".to_string(),
        inherent_state: Some(AssetState::Baked),
        tags: vec!["ui".to_string()],
        ..Default::default()
    };
    let provider = MemoryProvider::new();
    provider.insert(
        "icons.ktx2",
        LoadedResource::new("ktx2-data").with_metadata(metadata.encode().unwrap()),
    );
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);
    let icons = storage.bind("texture", "icons.ktx2").unwrap();

    let raw = icons.request(AssetState::Raw).await.unwrap();
    assert_eq!(raw, "ktx2-data", "Raw on a pre-baked resource returns its bytes");
    assert_eq!(icons.state(), AssetState::Baked);
    assert_eq!(icons.data(AssetState::Raw), None);
    assert_data_matches_state(&icons);

    let loaded = icons.request(AssetState::Loaded).await.unwrap();
    assert_eq!(loaded, "loaded:ktx2-data");
    assert_eq!(counters.compiles(), 0);
    assert_eq!(storage.stats().runs(Stage::Baked), 0);

    let entry = icons.entry().unwrap();
    assert_eq!(entry.resource_state(), AssetState::Baked);
    assert_eq!(icons.metadata().unwrap().tags, vec!["ui".to_string()]);
}

#[tokio::test]
async fn test_custom_classifier_is_clamped() {
    struct EverythingIsRuntime;
    impl StateClassifier for EverythingIsRuntime {
        fn classify(&self, _: &ResourceMetadata, _: &ResourceHandle) -> AssetState {
            AssetState::Runtime
        }
    }

    let provider = MemoryProvider::new();
    provider.insert_bytes("ready.bin", "ready");
    let counters = Counters::default();
    let storage = Storage::new(provider);
    storage
        .register_category(
            common::loader_only_category("blob", &counters).with_classifier(EverythingIsRuntime),
        )
        .unwrap();
    let blob = storage.bind("blob", "ready.bin").unwrap();

    blob.request(AssetState::Raw).await.unwrap();
    // The classifier cannot skip past Loaded.
    assert_eq!(blob.state(), AssetState::Loaded);
    assert_eq!(counters.loads(), 0);
}

#[tokio::test]
async fn test_categories_without_compiler_or_hook_pass_through() {
    let provider = MemoryProvider::new();
    provider.insert_bytes("level.dat", "level");
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);
    let level = storage.bind("blob", "level.dat").unwrap();

    let runtime = level.request(AssetState::Runtime).await.unwrap();

    assert_eq!(runtime, "loaded:level");
    assert_eq!(level.data(AssetState::Baked).unwrap(), "level");
    assert_eq!(level.data(AssetState::Loaded).unwrap(), "loaded:level");
    assert_eq!(counters.compiles(), 0);
    assert_eq!(counters.loads(), 1);
    assert_data_matches_state(&level);
}

#[tokio::test]
async fn test_malformed_metadata_fails_the_raw_stage() {
    let provider = MemoryProvider::new();
    provider.insert(
        "bad.png",
        LoadedResource::new("pixels").with_metadata(Bytes::from_static(&[0xff; 3])),
    );
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);
    let texture = storage.bind("texture", "bad.png").unwrap();

    let error = texture.request(AssetState::Baked).await.unwrap_err();

    assert!(matches!(error, AssetError::Provider { .. }), "{error:?}");
    assert!(error.to_string().contains("malformed resource metadata"));
    assert_eq!(texture.state(), AssetState::Exists);
    assert_eq!(counters.compiles(), 0);
}

#[tokio::test]
async fn test_binding_and_request_errors() {
    let provider = MemoryProvider::new();
    provider.insert_bytes("texture.png", "pixels");
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);

    assert_eq!(
        storage.bind("audio", "texture.png").unwrap_err(),
        AssetError::UnknownCategory("audio".into())
    );
    assert_eq!(
        storage
            .register_category(common::loader_only_category("texture", &counters))
            .unwrap_err(),
        AssetError::DuplicateCategory("texture".into())
    );

    // A missing resource is not an error, just an empty handle.
    let missing = storage.bind("texture", "missing.png").unwrap();
    assert!(missing.is_empty());
    assert_eq!(missing.state(), AssetState::Invalid);
    assert_eq!(
        missing.request(AssetState::Raw).await.unwrap_err(),
        AssetError::EmptyHandle
    );

    let texture = storage.bind("texture", "texture.png").unwrap();
    assert_eq!(
        texture.request(AssetState::Exists).await.unwrap_err(),
        AssetError::NotEscalatable(AssetState::Exists)
    );

    let stats = storage.stats();
    assert_eq!(stats.binds, 2, "binds in unknown categories are not counted");
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_handles_share_one_entry() {
    let provider = MemoryProvider::new();
    provider.insert_bytes("texture.png", "pixels");
    let counters = Counters::default();
    let storage = storage_with(provider, &counters);

    let first = storage.bind("texture", "texture.png").unwrap();
    let second = storage.bind("texture", "texture.png").unwrap();
    let third = second.clone();
    assert!(Arc::ptr_eq(first.entry().unwrap(), third.entry().unwrap()));
    assert_eq!(first.entry().unwrap().ref_count(), 3);

    first.request(AssetState::Baked).await.unwrap();
    assert_eq!(third.state(), AssetState::Baked);
    assert_eq!(third.name().unwrap().as_str(), "texture.png");
    assert_eq!(third.category().unwrap().as_str(), "texture");
    assert_eq!(storage.live_entries("texture").unwrap(), 1);
}
