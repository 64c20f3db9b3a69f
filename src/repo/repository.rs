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

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::env::init;
use crate::store::{Backend, BlobId, BlobKey, BlobType};

use super::config::{RepoConfig, RepoId, RepoInfo};
use super::encryption::MasterKeys;
use super::keys::{KeyInfo, KeyRecord};
use super::open_options::OpenOptions;

/// The outcome of trying one key record.
enum Attempt {
    Unlocked(MasterKeys),
    WrongPassword,
    Unusable,
}

/// An unlocked repository.
///
/// A `Repository` only exists once a password has unlocked its master keys, and [`close`]
/// consumes it, so no operation can be issued against a locked or closed repository.
///
/// Blobs stored through [`save`] are encrypted with the master keys and addressed by the hash of
/// their ciphertext. Blobs can also be stored directly through [`backend`] by callers that do
/// their own encryption.
///
/// [`close`]: crate::repo::Repository::close
/// [`save`]: crate::repo::Repository::save
/// [`backend`]: crate::repo::Repository::backend
pub struct Repository {
    backend: Box<dyn Backend>,
    master_keys: Arc<MasterKeys>,
    config: RepoConfig,
    current_key: BlobId,
}

impl Debug for Repository {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .field("current_key", &self.current_key)
            .finish_non_exhaustive()
    }
}

/// Seal `master_keys` under `password` and store the record, returning its ID.
fn write_key_record(
    backend: &mut dyn Backend,
    master_keys: &MasterKeys,
    password: &[u8],
    options: &OpenOptions,
) -> crate::Result<BlobId> {
    let record = KeyRecord::seal(master_keys, password, options.kdf_params(), options.key_label())?;
    let bytes = record.to_bytes()?;
    let id = BlobId::hash(&bytes);
    backend.put(BlobKey::Key(id), &bytes)?;
    Ok(id)
}

/// Read the key record with the given `id` and try to unlock it with `password`.
fn try_key_record(backend: &mut dyn Backend, id: BlobId, password: &[u8]) -> crate::Result<Attempt> {
    let bytes = match backend.get(BlobKey::Key(id)) {
        Ok(bytes) => bytes,
        // The record was removed after it was listed.
        Err(crate::Error::NotFound) => return Ok(Attempt::Unusable),
        Err(error) => return Err(error),
    };

    if BlobId::hash(&bytes) != id {
        warn!("Skipping key record {} because its contents do not match its ID.", id);
        return Ok(Attempt::Unusable);
    }

    let record = match KeyRecord::from_bytes(&bytes) {
        Ok(record) => record,
        Err(_) => {
            warn!("Skipping key record {} because it could not be parsed.", id);
            return Ok(Attempt::Unusable);
        }
    };

    match record.unseal(password) {
        Ok(master_keys) => Ok(Attempt::Unlocked(master_keys)),
        Err(crate::Error::Password) => Ok(Attempt::WrongPassword),
        Err(crate::Error::Corrupt) => {
            warn!("Skipping key record {} because it is malformed.", id);
            Ok(Attempt::Unusable)
        }
        Err(error) => Err(error),
    }
}

impl Repository {
    /// Create a new repository in empty storage.
    pub(super) fn create(
        mut backend: Box<dyn Backend>,
        options: &OpenOptions,
        password: &[u8],
    ) -> crate::Result<Self> {
        init();

        if backend.test(BlobKey::Config)? {
            return Err(crate::Error::AlreadyExists);
        }

        let master_keys = MasterKeys::generate();
        let config = RepoConfig::new(options.repo_chunking());

        let current_key = write_key_record(backend.as_mut(), &master_keys, password, options)?;

        // The repository is only discoverable once the configuration exists, so it goes last.
        let sealed_config = master_keys.encrypt(&config.to_bytes()?);
        backend.put(BlobKey::Config, &sealed_config)?;

        info!("Created repository {}.", config.id());

        Ok(Repository {
            backend,
            master_keys: Arc::new(master_keys),
            config,
            current_key,
        })
    }

    /// Unlock an existing repository with `password`.
    pub(super) fn open(mut backend: Box<dyn Backend>, password: &[u8]) -> crate::Result<Self> {
        init();

        if !backend.test(BlobKey::Config)? {
            return Err(crate::Error::NotFound);
        }

        let key_ids = backend
            .list(BlobType::Key)?
            .collect::<crate::Result<Vec<_>>>()?;
        debug!("Trying {} key records.", key_ids.len());

        let mut saw_wrong_password = false;
        let mut unlocked = None;
        for id in key_ids {
            match try_key_record(backend.as_mut(), id, password)? {
                Attempt::Unlocked(master_keys) => {
                    unlocked = Some((id, master_keys));
                    break;
                }
                Attempt::WrongPassword => saw_wrong_password = true,
                Attempt::Unusable => {}
            }
        }

        let (current_key, master_keys) = match unlocked {
            Some(unlocked) => unlocked,
            None if saw_wrong_password => return Err(crate::Error::Password),
            None => return Err(crate::Error::Corrupt),
        };

        let sealed_config = backend.get(BlobKey::Config)?;
        let config = RepoConfig::from_bytes(&master_keys.decrypt(&sealed_config)?)?;

        info!("Opened repository {} with key record {}.", config.id(), current_key);

        Ok(Repository {
            backend,
            master_keys: Arc::new(master_keys),
            config,
            current_key,
        })
    }

    /// The unique ID of this repository.
    pub fn id(&self) -> RepoId {
        self.config.id()
    }

    /// The persisted configuration of this repository.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Information about this repository.
    pub fn info(&self) -> RepoInfo {
        RepoInfo::new(&self.config)
    }

    /// The unlocked master keys.
    ///
    /// These are immutable, so the returned handle can be shared with other threads.
    pub fn master_keys(&self) -> &Arc<MasterKeys> {
        &self.master_keys
    }

    /// The ID of the key record which unlocked this session.
    pub fn current_key(&self) -> BlobId {
        self.current_key
    }

    /// The backend this repository is stored in.
    pub fn backend(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    /// Return information about every readable key record in the repository.
    ///
    /// Records which can't be parsed are skipped.
    pub fn keys(&mut self) -> crate::Result<Vec<KeyInfo>> {
        let ids = self
            .backend
            .list(BlobType::Key)?
            .collect::<crate::Result<Vec<_>>>()?;

        let mut keys = Vec::with_capacity(ids.len());
        for id in ids {
            let bytes = match self.backend.get(BlobKey::Key(id)) {
                Ok(bytes) => bytes,
                Err(crate::Error::NotFound) => continue,
                Err(error) => return Err(error),
            };
            match KeyRecord::from_bytes(&bytes) {
                Ok(record) => keys.push(record.info(id)),
                Err(_) => warn!("Skipping key record {} because it could not be parsed.", id),
            }
        }
        Ok(keys)
    }

    /// Add a key record which unlocks this repository with `password`.
    ///
    /// The cost limits and label are taken from `options`. This returns the ID of the new record.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage medium.
    pub fn add_key(&mut self, password: &[u8], options: &OpenOptions) -> crate::Result<BlobId> {
        let id = write_key_record(self.backend.as_mut(), &self.master_keys, password, options)?;
        info!("Added key record {} to repository {}.", id, self.id());
        Ok(id)
    }

    /// Remove the key record with the given `id`.
    ///
    /// # Errors
    /// - `Error::KeyInUse`: The record is the one which unlocked this session.
    /// - `Error::NotFound`: There is no key record with the given `id`.
    /// - `Error::Store`: An error occurred with the storage medium.
    pub fn remove_key(&mut self, id: BlobId) -> crate::Result<()> {
        if id == self.current_key {
            return Err(crate::Error::KeyInUse);
        }
        self.backend.remove(BlobKey::Key(id))?;
        info!("Removed key record {} from repository {}.", id, self.id());
        Ok(())
    }

    /// Encrypt `plaintext` and store it as a blob of the given `kind`.
    ///
    /// This returns the ID of the stored ciphertext. Key records are managed with [`add_key`]
    /// instead; storing other data as `BlobType::Key` makes it look like a damaged key record.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage medium.
    ///
    /// [`add_key`]: crate::repo::Repository::add_key
    pub fn save(&mut self, kind: BlobType, plaintext: &[u8]) -> crate::Result<BlobId> {
        let ciphertext = self.master_keys.encrypt(plaintext);
        let id = BlobId::hash(&ciphertext);
        self.backend.put(BlobKey::new(kind, id), &ciphertext)?;
        Ok(id)
    }

    /// Load and decrypt the blob of the given `kind` with the given `id`.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no such blob.
    /// - `Error::Corrupt`: The blob does not match its ID or fails to decrypt.
    /// - `Error::Store`: An error occurred with the storage medium.
    pub fn load(&mut self, kind: BlobType, id: BlobId) -> crate::Result<Vec<u8>> {
        let ciphertext = self.backend.get(BlobKey::new(kind, id))?;
        if BlobId::hash(&ciphertext) != id {
            return Err(crate::Error::Corrupt);
        }
        self.master_keys.decrypt(&ciphertext)
    }

    /// Close the repository and release its backend.
    pub fn close(mut self) -> crate::Result<()> {
        info!("Closing repository {}.", self.id());
        self.backend.close()
    }
}
