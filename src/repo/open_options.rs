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

use std::time::Duration;

use crate::store::{Location, OpenBackend};

use super::config::Chunking;
use super::encryption::{KdfParams, ResourceLimit};
use super::repository::Repository;

/// Open or create a repository.
///
/// This type is a builder used to open or create repositories. Typically, when using
/// `OpenOptions`, you'll first call [`new`], then chain method calls to configure the repository,
/// and then finally call [`create`] or [`open`] with the configuration for a backend, or
/// [`create_at`] or [`open_at`] with a location string.
///
/// The cost limits, chunking method, and label only apply when a new key record or a new
/// repository is created. Existing key records are always opened with the parameters they were
/// created with.
///
/// # Examples
/// ```no_run
/// use sealed_store::repo::{Chunking, OpenOptions, ResourceLimit};
///
/// let repo = OpenOptions::new()
///     .memory_limit(ResourceLimit::Moderate)
///     .chunking(Chunking::FIXED)
///     .label("backup server")
///     .create_at("/var/backups/repo", b"correct horse battery staple")
///     .unwrap();
/// println!("Created repository {}", repo.id().short());
/// ```
///
/// [`new`]: crate::repo::OpenOptions::new
/// [`create`]: crate::repo::OpenOptions::create
/// [`open`]: crate::repo::OpenOptions::open
/// [`create_at`]: crate::repo::OpenOptions::create_at
/// [`open_at`]: crate::repo::OpenOptions::open_at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    memory_limit: ResourceLimit,
    operations_limit: ResourceLimit,
    chunking: Chunking,
    timeout: Option<Duration>,
    label: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    /// Create a new `OpenOptions` with the default configuration.
    pub fn new() -> Self {
        OpenOptions {
            memory_limit: ResourceLimit::Interactive,
            operations_limit: ResourceLimit::Interactive,
            chunking: Chunking::default(),
            timeout: None,
            label: None,
        }
    }

    /// The maximum amount of memory key derivation will use.
    ///
    /// The default value is `ResourceLimit::Interactive`.
    pub fn memory_limit(&mut self, limit: ResourceLimit) -> &mut Self {
        self.memory_limit = limit;
        self
    }

    /// The maximum number of computations key derivation will perform.
    ///
    /// The default value is `ResourceLimit::Interactive`.
    pub fn operations_limit(&mut self, limit: ResourceLimit) -> &mut Self {
        self.operations_limit = limit;
        self
    }

    /// The chunking method of a new repository.
    ///
    /// The default value is `Chunking::ZPAQ`. This is ignored when opening a repository.
    pub fn chunking(&mut self, method: Chunking) -> &mut Self {
        self.chunking = method;
        self
    }

    /// Bound every request to a remote location by `timeout`.
    ///
    /// This only applies to [`create_at`] and [`open_at`] with remote locations. The default is
    /// the timeout of [`RemoteConfig::ssh`].
    ///
    /// [`create_at`]: crate::repo::OpenOptions::create_at
    /// [`open_at`]: crate::repo::OpenOptions::open_at
    /// [`RemoteConfig::ssh`]: crate::store::RemoteConfig::ssh
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// A description stored alongside new key records.
    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    /// Generate key derivation parameters for a new key record.
    pub(super) fn kdf_params(&self) -> KdfParams {
        KdfParams::generate(self.memory_limit, self.operations_limit)
    }

    pub(super) fn key_label(&self) -> Option<String> {
        self.label.clone()
    }

    pub(super) fn repo_chunking(&self) -> Chunking {
        self.chunking.clone()
    }

    fn location(&self, location: &str) -> crate::Result<Location> {
        let location: Location = location.parse()?;
        Ok(match self.timeout {
            Some(timeout) => location.with_timeout(timeout),
            None => location,
        })
    }

    /// Create new storage with `backend` and a new repository in it protected by `password`.
    ///
    /// # Errors
    /// - `Error::AlreadyExists`: Storage or a repository already exists there.
    /// - `Error::ConnectionFailed`: The transport could not be established.
    /// - `Error::Store`: An error occurred with the storage medium.
    pub fn create(&self, backend: &impl OpenBackend, password: &[u8]) -> crate::Result<Repository> {
        let backend = backend.create()?;
        Repository::create(Box::new(backend), self, password)
    }

    /// Open the repository in the existing storage of `backend` with `password`.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no repository there.
    /// - `Error::Password`: No key record could be unlocked with `password`.
    /// - `Error::Corrupt`: The key records or the configuration are damaged.
    /// - `Error::UnsupportedFormat`: The repository format is not supported.
    /// - `Error::ConnectionFailed`: The transport could not be established.
    /// - `Error::Store`: An error occurred with the storage medium.
    pub fn open(&self, backend: &impl OpenBackend, password: &[u8]) -> crate::Result<Repository> {
        let backend = backend.open()?;
        Repository::open(Box::new(backend), password)
    }

    /// Create a repository at the given `location` string.
    ///
    /// See [`Location`] for the syntax and [`create`] for the errors. This also fails with
    /// `Error::InvalidLocation` if `location` is malformed.
    ///
    /// [`Location`]: crate::store::Location
    /// [`create`]: crate::repo::OpenOptions::create
    pub fn create_at(&self, location: &str, password: &[u8]) -> crate::Result<Repository> {
        self.create(&self.location(location)?, password)
    }

    /// Open the repository at the given `location` string.
    ///
    /// See [`Location`] for the syntax and [`open`] for the errors. This also fails with
    /// `Error::InvalidLocation` if `location` is malformed.
    ///
    /// [`Location`]: crate::store::Location
    /// [`open`]: crate::repo::OpenOptions::open
    pub fn open_at(&self, location: &str, password: &[u8]) -> crate::Result<Repository> {
        self.open(&self.location(location)?, password)
    }
}
