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

//! Password-protected repositories.
//!
//! This module turns a password into access to a repository stored in a [`Backend`]. A
//! repository has a configuration, which holds its unique [`RepoId`], and one or more key records,
//! each of which holds a copy of the repository's [`MasterKeys`] sealed under a key derived from a
//! password. You can create or open a repository using [`OpenOptions`], which produces an unlocked
//! [`Repository`].
//!
//! # Key derivation
//! Password keys are derived with Argon2id. The cost of derivation is configured with
//! [`ResourceLimit`] values when a key record is created, and the resulting parameters are stored
//! in the record, so changing the defaults never locks anyone out of an existing repository.
//!
//! # Encryption
//! Master keys are sealed with XChaCha20-Poly1305. The configuration and any blobs stored through
//! [`Repository::save`] are encrypted with the master encryption key. Nothing derived from a
//! password or the master keys is ever written to a backend unencrypted.
//!
//! # Creation
//! The configuration is the last thing written when a repository is created. If creation is
//! interrupted, the storage does not contain a repository and opening it fails with
//! `Error::NotFound`.
//!
//! # Locking
//! Repositories do not protect against concurrent access from multiple processes or machines.
//!
//! [`Backend`]: crate::store::Backend
//! [`RepoId`]: crate::repo::RepoId
//! [`MasterKeys`]: crate::repo::MasterKeys
//! [`OpenOptions`]: crate::repo::OpenOptions
//! [`Repository`]: crate::repo::Repository
//! [`ResourceLimit`]: crate::repo::ResourceLimit
//! [`Repository::save`]: crate::repo::Repository::save

pub use self::config::{Chunking, RepoConfig, RepoId, RepoInfo, FORMAT_VERSION};
pub use self::encryption::{EncryptionKey, KdfParams, MasterKeys, ResourceLimit, KEY_SIZE};
pub use self::keys::KeyInfo;
pub use self::open_options::OpenOptions;
pub use self::repository::Repository;

mod config;
mod encryption;
mod keys;
mod open_options;
mod repository;
