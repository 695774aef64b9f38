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

use super::AssetState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serializable metadata a resource provider ships alongside the raw bytes.
///
/// This is the "identity card" the Raw stage reads to decide how far a
/// resource already is (a texture may be stored pre-baked on disk) and what
/// it depends on. It travels as `bincode` bytes and is decoded once, when the
/// raw bytes are fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// A string identifier for the asset's type (e.g., "texture", "shader").
    pub asset_type_name: String,

    /// The state the stored bytes are already in, when known.
    /// `None` means the bytes are plain source (`Raw`).
    pub inherent_state: Option<AssetState>,

    /// Names of other assets this one refers to.
    pub dependencies: Vec<String>,

    /// A collection of semantic tags for querying and organization.
    pub tags: Vec<String>,

    /// Free-form key/value settings handed to compilers and loaders.
    pub properties: HashMap<String, String>,
}

impl ResourceMetadata {
    /// Decodes metadata from its binary form.
    ///
    /// # Errors
    /// Returns a `DecodeError` if the bytes are not valid, bincode-encoded metadata.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let (metadata, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(metadata)
    }

    /// Encodes metadata into its binary form.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
    }

    /// Returns a property value by key.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_binary_form() {
        let metadata = ResourceMetadata {
            asset_type_name: "texture".to_string(),
            inherent_state: Some(AssetState::Baked),
            dependencies: vec!["textures/detail.png".to_string()],
            tags: vec!["terrain".to_string()],
            properties: HashMap::from([("srgb".to_string(), "true".to_string())]),
        };

        let bytes = metadata.encode().expect("encoding should succeed");
        let decoded = ResourceMetadata::decode(&bytes).expect("decoding should succeed");

        assert_eq!(decoded, metadata);
        assert_eq!(decoded.property("srgb"), Some("true"));
        assert_eq!(decoded.property("mips"), None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ResourceMetadata::decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
