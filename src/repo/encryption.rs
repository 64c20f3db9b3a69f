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

use std::convert::TryFrom;
use std::fmt::{self, Debug, Formatter};

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::zeroize::Zeroize;
use secrecy::{ExposeSecret, Secret, SecretVec};
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::aead::xchacha20poly1305_ietf::{
    gen_nonce, open, seal, Key as ChaChaKey, Nonce, KEYBYTES, NONCEBYTES,
};
use sodiumoxide::crypto::pwhash::argon2id13::{
    derive_key, gen_salt, MemLimit, OpsLimit, Salt, MEMLIMIT_INTERACTIVE, MEMLIMIT_MODERATE,
    MEMLIMIT_SENSITIVE, OPSLIMIT_INTERACTIVE, OPSLIMIT_MODERATE, OPSLIMIT_SENSITIVE, SALTBYTES,
};

use crate::env::init;
use crate::store::BlobId;

/// The size of every key in bytes.
pub const KEY_SIZE: usize = KEYBYTES;

/// A limit on the resources used by a key derivation function.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ResourceLimit {
    /// Suitable for interactive use.
    Interactive,

    /// Suitable for moderately sensitive data.
    Moderate,

    /// Suitable for highly sensitive data.
    Sensitive,
}

impl ResourceLimit {
    fn to_mem_limit(self) -> MemLimit {
        match self {
            ResourceLimit::Interactive => MEMLIMIT_INTERACTIVE,
            ResourceLimit::Moderate => MEMLIMIT_MODERATE,
            ResourceLimit::Sensitive => MEMLIMIT_SENSITIVE,
        }
    }

    fn to_ops_limit(self) -> OpsLimit {
        match self {
            ResourceLimit::Interactive => OPSLIMIT_INTERACTIVE,
            ResourceLimit::Moderate => OPSLIMIT_MODERATE,
            ResourceLimit::Sensitive => OPSLIMIT_SENSITIVE,
        }
    }
}

/// The parameters used to derive a key from a password.
///
/// These are persisted with each key record as raw numbers, so records created with older
/// defaults can still be opened.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    /// The random salt.
    pub salt: Vec<u8>,

    /// The Argon2id memory limit in bytes.
    pub memory_limit: u64,

    /// The Argon2id operations limit.
    pub operations_limit: u64,
}

impl KdfParams {
    /// Generate parameters with a fresh random salt and the given cost limits.
    pub fn generate(memory: ResourceLimit, operations: ResourceLimit) -> Self {
        init();
        KdfParams {
            salt: gen_salt().as_ref().to_vec(),
            memory_limit: memory.to_mem_limit().0 as u64,
            operations_limit: operations.to_ops_limit().0 as u64,
        }
    }

    /// Derive a key from `password` using these parameters.
    ///
    /// # Errors
    /// - `Error::Corrupt`: The parameters are malformed or exceed the most expensive cost limits.
    pub fn derive(&self, password: &[u8]) -> crate::Result<EncryptionKey> {
        init();

        if self.salt.len() != SALTBYTES
            || self.memory_limit > MEMLIMIT_SENSITIVE.0 as u64
            || self.operations_limit > OPSLIMIT_SENSITIVE.0 as u64
        {
            return Err(crate::Error::Corrupt);
        }

        let salt = Salt::from_slice(&self.salt).ok_or(crate::Error::Corrupt)?;
        let memory = usize::try_from(self.memory_limit).map_err(|_| crate::Error::Corrupt)?;
        let operations =
            usize::try_from(self.operations_limit).map_err(|_| crate::Error::Corrupt)?;

        let mut bytes = [0u8; KEY_SIZE];
        let result = derive_key(
            &mut bytes,
            password,
            &salt,
            OpsLimit(operations),
            MemLimit(memory),
        )
        .map(|_| ());
        let key = EncryptionKey::new(bytes);
        bytes.zeroize();

        // libsodium rejects limits below its minimums.
        result.map_err(|()| crate::Error::Corrupt)?;
        Ok(key)
    }
}

/// A secret 256-bit key.
///
/// The bytes of the key are zeroed in memory when this value is dropped.
pub struct EncryptionKey(Secret<[u8; KEY_SIZE]>);

impl Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

impl ExposeSecret<[u8; KEY_SIZE]> for EncryptionKey {
    fn expose_secret(&self) -> &[u8; KEY_SIZE] {
        self.0.expose_secret()
    }
}

impl EncryptionKey {
    /// Create an encryption key containing the given `bytes`.
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        EncryptionKey(Secret::new(bytes))
    }

    /// Generate a new random key.
    ///
    /// This uses the operating system's cryptographically secure random number generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        let key = EncryptionKey::new(bytes);
        bytes.zeroize();
        key
    }

    /// Encrypt `plaintext` with XChaCha20-Poly1305 under this key.
    ///
    /// The output is the random nonce followed by the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        init();
        let nonce = gen_nonce();
        let key = ChaChaKey(*self.expose_secret());
        let mut output = nonce.as_ref().to_vec();
        output.extend_from_slice(&seal(plaintext, None, &nonce, &key));
        output
    }

    /// Decrypt `ciphertext` produced by `encrypt`.
    ///
    /// This returns `None` if the ciphertext is malformed or fails authentication.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Option<SecretVec<u8>> {
        init();
        if ciphertext.len() < NONCEBYTES {
            return None;
        }
        let nonce = Nonce::from_slice(&ciphertext[..NONCEBYTES])?;
        let key = ChaChaKey(*self.expose_secret());
        open(&ciphertext[NONCEBYTES..], None, &nonce, &key)
            .ok()
            .map(Secret::new)
    }
}

/// The master keys of a repository.
///
/// These are generated when the repository is created and never change. They are stored only in
/// sealed key records, and are immutable once unlocked, so they can be shared freely between
/// threads.
pub struct MasterKeys {
    encryption: EncryptionKey,
    authentication: EncryptionKey,
}

impl Debug for MasterKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeys").finish_non_exhaustive()
    }
}

impl MasterKeys {
    /// The size of the serialized keys in bytes.
    pub(super) const SERIALIZED_SIZE: usize = KEY_SIZE * 2;

    /// Generate a new set of random keys.
    pub fn generate() -> Self {
        MasterKeys {
            encryption: EncryptionKey::generate(),
            authentication: EncryptionKey::generate(),
        }
    }

    /// Serialize these keys so they can be sealed.
    pub(super) fn to_bytes(&self) -> SecretVec<u8> {
        let mut bytes = Vec::with_capacity(Self::SERIALIZED_SIZE);
        bytes.extend_from_slice(self.encryption.expose_secret());
        bytes.extend_from_slice(self.authentication.expose_secret());
        Secret::new(bytes)
    }

    /// Deserialize keys produced by `to_bytes`.
    pub(super) fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SERIALIZED_SIZE {
            return None;
        }
        let mut encryption = [0u8; KEY_SIZE];
        let mut authentication = [0u8; KEY_SIZE];
        encryption.copy_from_slice(&bytes[..KEY_SIZE]);
        authentication.copy_from_slice(&bytes[KEY_SIZE..]);
        let keys = MasterKeys {
            encryption: EncryptionKey::new(encryption),
            authentication: EncryptionKey::new(authentication),
        };
        encryption.zeroize();
        authentication.zeroize();
        Some(keys)
    }

    /// Encrypt `plaintext` with the master encryption key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.encryption.encrypt(plaintext)
    }

    /// Decrypt `ciphertext` produced by `encrypt`.
    ///
    /// # Errors
    /// - `Error::Corrupt`: The ciphertext is malformed or failed authentication.
    pub fn decrypt(&self, ciphertext: &[u8]) -> crate::Result<Vec<u8>> {
        self.encryption
            .decrypt(ciphertext)
            .map(|plaintext| plaintext.expose_secret().clone())
            .ok_or(crate::Error::Corrupt)
    }

    /// Compute a keyed BLAKE3 MAC of `data` with the master authentication key.
    ///
    /// This can be used to derive IDs from plaintext without revealing a plain hash of it.
    pub fn mac(&self, data: &[u8]) -> BlobId {
        BlobId::from_bytes(*blake3::keyed_hash(self.authentication.expose_secret(), data).as_bytes())
    }
}
