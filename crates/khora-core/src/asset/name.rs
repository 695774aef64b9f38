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

//! Cheap-to-clone identities used as registry keys.

use super::AssetUUID;
use std::{borrow::Borrow, fmt, sync::Arc};

macro_rules! shared_str_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Creates the identifier from any string-like value.
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(Arc::from(value.as_ref()))
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(Arc::from(value))
            }
        }
    };
}

shared_str_id!(
    /// The logical name an asset is bound by (e.g. `"textures/brick.png"`).
    AssetName
);

shared_str_id!(
    /// The category an asset belongs to (e.g. `"texture"`, `"shader"`).
    ///
    /// Each category owns one registry with its own collaborators.
    CategoryId
);

/// Identity of the resource backing an entry, as resolved by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    uri: Arc<str>,
    uuid: AssetUUID,
}

impl ResourceHandle {
    /// Creates a handle for `uri`, deriving its stable UUID.
    pub fn new(uri: impl AsRef<str>) -> Self {
        let uri = uri.as_ref();
        Self {
            uuid: AssetUUID::new_v5(uri),
            uri: Arc::from(uri),
        }
    }

    /// The URI the provider resolved.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The stable identifier of the resource.
    pub fn uuid(&self) -> AssetUUID {
        self.uuid
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uri, self.uuid)
    }
}
