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

//! Provides the foundational types and contracts of Khora's asset content cache.
//!
//! This module defines the "common language" of the cache. It has no knowledge
//! of how entries are stored or how requests are scheduled; it only says what
//! an asset can be and who the cache talks to.
//!
//! The key components are:
//! - [`AssetState`] and [`Stage`]: the ordered lifecycle every asset climbs.
//! - [`AssetName`], [`CategoryId`] and [`ResourceHandle`]: identities.
//! - [`ResourceProvider`]: the byte-level boundary.
//! - [`AssetCompiler`], [`AssetLoader`], [`RuntimeHook`] and [`StateClassifier`]:
//!   the per-category collaborators, grouped in a [`CategoryDefinition`].
//! - [`AssetError`]: the failure taxonomy every request resolves to.

mod category;
mod error;
mod metadata;
mod name;
mod producer;
mod provider;
mod state;
mod uuid;

pub use category::*;
pub use error::*;
pub use metadata::*;
pub use name::*;
pub use producer::*;
pub use provider::*;
pub use state::*;
pub use uuid::*;
