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

use super::{AssetName, AssetState, CategoryId, Stage};
use thiserror::Error;

/// Result alias used throughout the asset cache.
pub type AssetResult<T> = Result<T, AssetError>;

/// Every failure a request, bind or registration can resolve to.
///
/// The type is `Clone` because a single producer failure is delivered to the
/// head request and to every follower of the same escalation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// No category with this id was registered.
    #[error("no asset category '{0}' is registered")]
    UnknownCategory(CategoryId),

    /// A category with this id was already registered.
    #[error("asset category '{0}' is already registered")]
    DuplicateCategory(CategoryId),

    /// The handle is empty because the backing resource was not found.
    #[error("the asset handle is empty")]
    EmptyHandle,

    /// The requested state is not one of the four escalation stages.
    #[error("state {0} cannot be requested")]
    NotEscalatable(AssetState),

    /// The resource provider could not deliver the raw bytes or metadata.
    #[error("provider failed to load '{name}': {reason}")]
    Provider {
        /// The asset being loaded.
        name: AssetName,
        /// The provider's error, with its full context chain.
        reason: String,
    },

    /// A compiler, loader or runtime hook reported a failure.
    #[error("{stage} stage failed for '{name}': {reason}")]
    Producer {
        /// The asset being escalated.
        name: AssetName,
        /// The stage whose producer failed.
        stage: Stage,
        /// The collaborator's error, with its full context chain.
        reason: String,
    },

    /// The producing future was dropped before it resolved.
    #[error("{stage} escalation of '{name}' was abandoned")]
    Abandoned {
        /// The asset being escalated.
        name: AssetName,
        /// The stage that was left unresolved.
        stage: Stage,
    },

    /// The entry was reset while the caller was waiting.
    #[error("'{0}' was released while a request was pending")]
    Released(AssetName),

    /// The storage that issued the handle no longer exists.
    #[error("the asset storage was dropped")]
    StorageDropped,
}

impl AssetError {
    /// Wraps a provider error, keeping its context chain.
    pub fn provider(name: &AssetName, error: &anyhow::Error) -> Self {
        Self::Provider {
            name: name.clone(),
            reason: format!("{error:#}"),
        }
    }

    /// Wraps a collaborator error raised while producing `stage`.
    pub fn producer(name: &AssetName, stage: Stage, error: &anyhow::Error) -> Self {
        Self::Producer {
            name: name.clone(),
            stage,
            reason: format!("{error:#}"),
        }
    }
}
