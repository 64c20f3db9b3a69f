/*
 * Copyright 2019-2022 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use anyhow::Context;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::id::ID_SIZE;

/// The current repository format version.
///
/// This must be changed any time a backwards-incompatible change is made to the format of the
/// configuration or the key records.
pub const FORMAT_VERSION: u32 = 1;

/// The number of hex characters in a [`RepoId::short`] prefix.
const SHORT_ID_LEN: usize = 10;

hex_id_type! {
    /// The unique identity of a repository.
    ///
    /// This is 256 bits from the operating system's secure random number generator, drawn once
    /// when the repository is created.
    RepoId
}

impl RepoId {
    /// Generate a new random ID.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_SIZE];
        OsRng.fill_bytes(&mut bytes);
        RepoId::from_bytes(bytes)
    }

    /// A short prefix of the hex encoding for display.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_ID_LEN);
        hex
    }
}

/// A method for chunking data stored in a repository.
///
/// This is recorded in the configuration when the repository is created so that every client
/// splits data the same way.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Chunking {
    /// Split data into fixed-size chunks.
    Fixed {
        /// The size of each chunk in bytes.
        size: u32,
    },

    /// Split data using the ZPAQ content-defined chunking algorithm.
    Zpaq {
        /// The average chunk size, which is 2^`bits` bytes.
        bits: u32,
    },
}

impl Chunking {
    /// A reasonable default value of `Chunking::Fixed`.
    pub const FIXED: Self = Self::Fixed { size: 1024 * 1024 };

    /// A reasonable default value of `Chunking::Zpaq`.
    pub const ZPAQ: Self = Self::Zpaq { bits: 18 };
}

impl Default for Chunking {
    fn default() -> Self {
        Chunking::ZPAQ
    }
}

/// The persisted configuration of a repository.
///
/// This is written once when the repository is created, encrypted with the master keys, and never
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    version: u32,
    id: RepoId,
    chunking: Chunking,
}

impl RepoConfig {
    /// A configuration for a new repository with a fresh ID.
    pub(super) fn new(chunking: Chunking) -> Self {
        RepoConfig {
            version: FORMAT_VERSION,
            id: RepoId::generate(),
            chunking,
        }
    }

    /// The format version the repository was created with.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The unique ID of the repository.
    pub fn id(&self) -> RepoId {
        self.id
    }

    /// The chunking method of the repository.
    pub fn chunking(&self) -> &Chunking {
        &self.chunking
    }

    pub(super) fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        rmp_serde::to_vec(self)
            .context("Could not serialize the repository configuration.")
            .map_err(crate::Error::Store)
    }

    /// Parse and validate a decrypted configuration.
    ///
    /// # Errors
    /// - `Error::Corrupt`: The bytes are not a configuration.
    /// - `Error::UnsupportedFormat`: The configuration has an unknown format version.
    pub(super) fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let config: RepoConfig = rmp_serde::from_slice(bytes).map_err(|_| crate::Error::Corrupt)?;
        match config.version {
            0 => Err(crate::Error::Corrupt),
            FORMAT_VERSION => Ok(config),
            _ => Err(crate::Error::UnsupportedFormat),
        }
    }
}

/// Information about a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    id: RepoId,
    config: RepoConfig,
}

impl RepoInfo {
    pub(super) fn new(config: &RepoConfig) -> Self {
        RepoInfo {
            id: config.id,
            config: config.clone(),
        }
    }

    /// The unique ID of the repository.
    pub fn id(&self) -> RepoId {
        self.id
    }

    /// The configuration the repository was created with.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(RepoId::generate(), RepoId::generate());
    }

    #[test]
    fn short_id_is_a_prefix() {
        let id = RepoId::generate();
        assert_eq!(id.short().len(), SHORT_ID_LEN);
        assert!(id.to_string().starts_with(&id.short()));
    }

    #[test]
    fn config_round_trips() {
        let config = RepoConfig::new(Chunking::FIXED);
        let restored = RepoConfig::from_bytes(&config.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn unknown_version_is_unsupported() {
        let mut config = RepoConfig::new(Chunking::default());
        config.version = FORMAT_VERSION + 1;
        assert!(matches!(
            RepoConfig::from_bytes(&config.to_bytes().unwrap()),
            Err(crate::Error::UnsupportedFormat)
        ));
    }
}
