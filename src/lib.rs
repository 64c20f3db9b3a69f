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

//! `sealed-store` is the trust and storage core of an encrypted, deduplicating backup repository.
//!
//! This crate turns a password into access to a repository and exposes a uniform,
//! content-addressed blob store over interchangeable transports:
//! - Repository bootstrap and unlock, which derives keys from a password, seals the repository's
//! master keys in key records, and establishes a unique repository identity.
//! - A transport-agnostic `Backend` trait for storing immutable blobs, with a local filesystem
//! transport and a remote transport tunneled through a remote shell.
//!
//! No plaintext or key material is ever written to a backend unencrypted, and both transports
//! behave identically from the caller's point of view.
//!
//! The function `init` initializes the environment. Every function which needs it calls it, so
//! calling it yourself is optional.
//!
//! # Examples
//! ```no_run
//! use sealed_store::{create_repository, open_repository};
//! use sealed_store::store::BlobType;
//!
//! fn main() -> sealed_store::Result<()> {
//!     // Create a repository in a local directory.
//!     let (mut repo, id) = create_repository("/var/backups/repo", b"correct horse")?;
//!     println!("created repository {}", id.short());
//!
//!     // Store an encrypted blob.
//!     let blob_id = repo.save(BlobType::Snapshot, b"Data")?;
//!     repo.close()?;
//!
//!     // Open it again, possibly over ssh.
//!     let mut repo = open_repository("sftp://backup@example.com//var/backups/repo", b"correct horse")?;
//!     assert_eq!(repo.id(), id);
//!     assert_eq!(repo.load(BlobType::Snapshot, blob_id)?, b"Data");
//!
//!     repo.close()
//! }
//! ```
//!
//! # Features
//! Some functionality is gated behind cargo features:
//!
//! Type | Cargo Feature
//! --- | ---
//! `RemoteConfig` | `backend-remote`
//! `RemoteBackend` | `backend-remote`
//! `serve` | `backend-remote`
//!
//! The `backend-remote` feature is enabled by default. The remote client is only available on
//! Unix.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use env::init;
pub use error::{Error, Result};
pub use id::ParseIdError;
pub use repo::{OpenOptions, RepoId, Repository};

mod env;
mod error;
mod id;
pub mod repo;
pub mod store;

/// Create a repository at `location` protected by `password`.
///
/// `location` is either a bare filesystem path or `scheme://[user@]host[:port]/path`; see
/// [`Location`]. This uses the default [`OpenOptions`] and returns the new repository along with
/// its unique ID.
///
/// # Errors
/// - `Error::InvalidLocation`: `location` is malformed.
/// - `Error::AlreadyExists`: Storage already exists at `location`.
/// - `Error::ConnectionFailed`: The transport could not be established.
/// - `Error::Store`: An error occurred with the storage medium.
///
/// [`Location`]: crate::store::Location
/// [`OpenOptions`]: crate::repo::OpenOptions
pub fn create_repository(location: &str, password: &[u8]) -> Result<(Repository, RepoId)> {
    let repo = OpenOptions::new().create_at(location, password)?;
    let id = repo.id();
    Ok((repo, id))
}

/// Open the repository at `location` with `password`.
///
/// This uses the default [`OpenOptions`].
///
/// # Errors
/// - `Error::InvalidLocation`: `location` is malformed.
/// - `Error::NotFound`: There is no repository at `location`.
/// - `Error::Password`: No key record could be unlocked with `password`.
/// - `Error::Corrupt`: The repository is damaged.
/// - `Error::UnsupportedFormat`: The repository format is not supported.
/// - `Error::ConnectionFailed`: The transport could not be established.
/// - `Error::Store`: An error occurred with the storage medium.
///
/// [`OpenOptions`]: crate::repo::OpenOptions
pub fn open_repository(location: &str, password: &[u8]) -> Result<Repository> {
    OpenOptions::new().open_at(location, password)
}
