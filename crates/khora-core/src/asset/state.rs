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

//! The ordered lifecycle states of a cached asset.

use super::AssetError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The representation an asset entry currently holds.
///
/// States are strictly ordered. During a hot lifetime an entry only moves
/// forward (`Unknown → Exists → Raw → Baked → Loaded → Runtime`, possibly
/// skipping stages); it goes back to `Unknown` only when its last handle is
/// released.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum AssetState {
    /// The entry is unusable.
    Invalid = 0,
    /// Nothing is known yet, or the entry was reset.
    #[default]
    Unknown = 1,
    /// The backing resource is known to exist but no bytes are held.
    Exists = 2,
    /// The source bytes are held as fetched from the provider.
    Raw = 3,
    /// The compiled, platform-ready form is held.
    Baked = 4,
    /// The loader produced the runtime form.
    Loaded = 5,
    /// The runtime object is fully realized.
    Runtime = 6,
}

impl AssetState {
    /// Decodes a state from its `repr(u8)` value, mapping unknown values to `Invalid`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Unknown,
            2 => Self::Exists,
            3 => Self::Raw,
            4 => Self::Baked,
            5 => Self::Loaded,
            6 => Self::Runtime,
            _ => Self::Invalid,
        }
    }

    /// Returns the escalation stage for this state, if it has one.
    pub const fn stage(self) -> Option<Stage> {
        match self {
            Self::Raw => Some(Stage::Raw),
            Self::Baked => Some(Stage::Baked),
            Self::Loaded => Some(Stage::Loaded),
            Self::Runtime => Some(Stage::Runtime),
            _ => None,
        }
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One of the four escalatable states.
///
/// Every per-state array in the cache (awaiting counters, buffers, work
/// queues) is indexed by a `Stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Fetching bytes from the resource provider.
    Raw,
    /// Compiling raw bytes.
    Baked,
    /// Running the category loader.
    Loaded,
    /// Running the runtime materialization hook.
    Runtime,
}

impl Stage {
    /// All stages in escalation order.
    pub const ALL: [Stage; 4] = [Stage::Raw, Stage::Baked, Stage::Loaded, Stage::Runtime];

    /// Position of this stage in per-stage arrays.
    pub const fn index(self) -> usize {
        match self {
            Stage::Raw => 0,
            Stage::Baked => 1,
            Stage::Loaded => 2,
            Stage::Runtime => 3,
        }
    }

    /// The state an entry holds once this stage completed.
    pub const fn state(self) -> AssetState {
        match self {
            Stage::Raw => AssetState::Raw,
            Stage::Baked => AssetState::Baked,
            Stage::Loaded => AssetState::Loaded,
            Stage::Runtime => AssetState::Runtime,
        }
    }

    /// The stage that must complete before this one, if any.
    pub const fn below(self) -> Option<Stage> {
        match self {
            Stage::Raw => None,
            Stage::Baked => Some(Stage::Raw),
            Stage::Loaded => Some(Stage::Baked),
            Stage::Runtime => Some(Stage::Loaded),
        }
    }

    /// Iterates the stages from `Raw` up to and including `self`.
    pub fn up_to(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().take(self.index() + 1)
    }

    /// Whether an entry in `current` satisfies this stage.
    ///
    /// `Raw` requires an exact match because a resource may already start
    /// above it; every other stage is satisfied at or above its state.
    pub fn is_satisfied_by(self, current: AssetState) -> bool {
        match self {
            Stage::Raw => current == AssetState::Raw,
            _ => current >= self.state(),
        }
    }

    /// Whether an entry in `current` has gone through this stage, possibly
    /// by skipping it.
    pub fn is_reached_by(self, current: AssetState) -> bool {
        current >= self.state()
    }
}

impl From<Stage> for AssetState {
    fn from(stage: Stage) -> Self {
        stage.state()
    }
}

impl TryFrom<AssetState> for Stage {
    type Error = AssetError;

    fn try_from(state: AssetState) -> Result<Self, Self::Error> {
        state.stage().ok_or(AssetError::NotEscalatable(state))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.state(), f)
    }
}
