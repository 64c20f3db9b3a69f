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

use std::time::SystemTime;

use anyhow::Context;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::encryption::{KdfParams, MasterKeys};
use crate::store::BlobId;

/// A copy of the master keys sealed under a password.
///
/// The sealed ciphertext is the last field so that damage to the end of a stored record changes
/// the ciphertext rather than the framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct KeyRecord {
    /// When this record was created.
    pub created: SystemTime,

    /// A caller-supplied description of the password.
    pub label: Option<String>,

    /// The parameters for deriving the password key.
    pub kdf: KdfParams,

    /// The master keys encrypted with the password key.
    pub sealed: Vec<u8>,
}

impl KeyRecord {
    /// Seal `master_keys` under a key derived from `password`.
    pub fn seal(
        master_keys: &MasterKeys,
        password: &[u8],
        kdf: KdfParams,
        label: Option<String>,
    ) -> crate::Result<Self> {
        let password_key = kdf.derive(password)?;
        let sealed = password_key.encrypt(master_keys.to_bytes().expose_secret());
        Ok(KeyRecord {
            created: SystemTime::now(),
            label,
            kdf,
            sealed,
        })
    }

    /// Unseal the master keys using `password`.
    ///
    /// # Errors
    /// - `Error::Password`: The ciphertext did not authenticate under the derived key.
    /// - `Error::Corrupt`: The parameters or the plaintext are malformed.
    pub fn unseal(&self, password: &[u8]) -> crate::Result<MasterKeys> {
        let password_key = self.kdf.derive(password)?;
        let plaintext = password_key
            .decrypt(&self.sealed)
            .ok_or(crate::Error::Password)?;
        MasterKeys::from_bytes(plaintext.expose_secret()).ok_or(crate::Error::Corrupt)
    }

    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        rmp_serde::to_vec(self)
            .context("Could not serialize a key record.")
            .map_err(crate::Error::Store)
    }

    /// Parse a stored record.
    ///
    /// # Errors
    /// - `Error::Corrupt`: The bytes are not a key record.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|_| crate::Error::Corrupt)
    }

    pub fn info(&self, id: BlobId) -> KeyInfo {
        KeyInfo {
            id,
            created: self.created,
            label: self.label.clone(),
        }
    }
}

/// Information about a key record in a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    id: BlobId,
    created: SystemTime,
    label: Option<String>,
}

impl KeyInfo {
    /// The ID of the key record.
    pub fn id(&self) -> BlobId {
        self.id
    }

    /// When the key record was created.
    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// The label given to the key record when it was created.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}
