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

//! # Khora IO
//!
//! Asset storage services: the [`Storage`] orchestrator that escalates assets
//! through their Raw, Baked, Loaded and Runtime stages, the [`Asset`] handles
//! callers hold, and reference resource providers.

#![warn(missing_docs)]

pub mod handle;
pub mod provider;
pub mod storage;

pub use handle::Asset;
pub use storage::{DispatchMode, Storage, StorageConfig, StorageStats};
