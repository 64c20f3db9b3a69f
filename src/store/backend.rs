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

use std::fmt;

use serde::{Deserialize, Serialize};
use static_assertions::assert_obj_safe;

use crate::error::Result;

hex_id_type! {
    /// The content-derived ID of a blob in a [`Backend`].
    ///
    /// This is the BLAKE3 digest of the bytes stored in the blob.
    ///
    /// [`Backend`]: crate::store::Backend
    BlobId
}

impl BlobId {
    /// Return the ID of a blob containing the given `data`.
    pub fn hash(data: &[u8]) -> Self {
        BlobId::from_bytes(*blake3::hash(data).as_bytes())
    }
}

/// A type of blob in a [`Backend`].
///
/// [`Backend`]: crate::store::Backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobType {
    Data,
    Key,
    Lock,
    Snapshot,
    Index,
}

impl BlobType {
    /// Every blob type which can be listed.
    pub const ALL: [BlobType; 5] = [
        BlobType::Data,
        BlobType::Key,
        BlobType::Lock,
        BlobType::Snapshot,
        BlobType::Index,
    ];

    /// A short, stable name for this blob type.
    pub fn name(self) -> &'static str {
        match self {
            BlobType::Data => "data",
            BlobType::Key => "keys",
            BlobType::Lock => "locks",
            BlobType::Snapshot => "snapshots",
            BlobType::Index => "index",
        }
    }
}

/// A key for accessing a blob in a [`Backend`].
///
/// A blob is uniquely identified by its type and its ID. The repository configuration is a
/// singleton and so it has no ID.
///
/// [`Backend`]: crate::store::Backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobKey {
    Data(BlobId),
    Key(BlobId),
    Lock(BlobId),
    Snapshot(BlobId),
    Index(BlobId),
    Config,
}

impl BlobKey {
    /// Return the key of the blob of the given `kind` with the given `id`.
    pub fn new(kind: BlobType, id: BlobId) -> Self {
        match kind {
            BlobType::Data => BlobKey::Data(id),
            BlobType::Key => BlobKey::Key(id),
            BlobType::Lock => BlobKey::Lock(id),
            BlobType::Snapshot => BlobKey::Snapshot(id),
            BlobType::Index => BlobKey::Index(id),
        }
    }

    /// The type of this blob, or `None` for the configuration.
    pub fn kind(&self) -> Option<BlobType> {
        match self {
            BlobKey::Data(_) => Some(BlobType::Data),
            BlobKey::Key(_) => Some(BlobType::Key),
            BlobKey::Lock(_) => Some(BlobType::Lock),
            BlobKey::Snapshot(_) => Some(BlobType::Snapshot),
            BlobKey::Index(_) => Some(BlobType::Index),
            BlobKey::Config => None,
        }
    }

    /// The ID of this blob, or `None` for the configuration.
    pub fn id(&self) -> Option<BlobId> {
        match self {
            BlobKey::Data(id)
            | BlobKey::Key(id)
            | BlobKey::Lock(id)
            | BlobKey::Snapshot(id)
            | BlobKey::Index(id) => Some(*id),
            BlobKey::Config => None,
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.id()) {
            (Some(kind), Some(id)) => write!(f, "{}/{}", kind.name(), id),
            _ => f.write_str("config"),
        }
    }
}

/// A lazy sequence of blob IDs returned by [`Backend::list`].
///
/// [`Backend::list`]: crate::store::Backend::list
pub type BlobIds<'a> = Box<dyn Iterator<Item = Result<BlobId>> + 'a>;

/// A persistent store for content-addressed blobs.
///
/// A `Backend` stores immutable blobs uniquely identified by [`BlobKey`] values. It is the storage
/// medium for repositories in the [`crate::repo`] module, and it doesn't have to worry about
/// encryption or integrity checking. Every implementation must behave identically from the
/// caller's point of view.
///
/// A backend is opened through a value implementing [`OpenBackend`]. Once [`close`] has been
/// called, every other method returns `Error::Closed`.
///
/// [`BlobKey`]: crate::store::BlobKey
/// [`OpenBackend`]: crate::store::OpenBackend
/// [`close`]: crate::store::Backend::close
pub trait Backend: fmt::Debug + Send {
    /// Return the full contents of the blob with the given `key`.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no blob with the given `key`.
    /// - `Error::Store`: An error occurred with the storage medium.
    fn get(&mut self, key: BlobKey) -> Result<Vec<u8>>;

    /// Write the given `data` as a new blob with the given `key`.
    ///
    /// Blobs are content-addressed, so if a blob with the given `key` already exists, this does
    /// nothing and returns `Ok`. The existing contents are not compared with `data`.
    ///
    /// If this method returns `Ok`, the blob is stored persistently until it is removed. If it
    /// returns `Err`, no partially written blob is ever visible to `get` or `list`.
    ///
    /// # Errors
    /// - `Error::Store`: An error occurred with the storage medium.
    fn put(&mut self, key: BlobKey, data: &[u8]) -> Result<()>;

    /// Return whether a blob with the given `key` exists without reading it.
    fn test(&mut self, key: BlobKey) -> Result<bool>;

    /// Remove the blob with the given `key`.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no blob with the given `key`.
    /// - `Error::Store`: An error occurred with the storage medium.
    fn remove(&mut self, key: BlobKey) -> Result<()>;

    /// Return the IDs of all blobs of the given `kind`.
    ///
    /// The order is defined by the implementation and may change between calls. The returned
    /// sequence is finite; call this method again to restart it.
    fn list(&mut self, kind: BlobType) -> Result<BlobIds<'_>>;

    /// Release the backend.
    ///
    /// Calling this more than once does nothing.
    fn close(&mut self) -> Result<()>;
}

assert_obj_safe!(Backend);

impl Backend for Box<dyn Backend> {
    fn get(&mut self, key: BlobKey) -> Result<Vec<u8>> {
        self.as_mut().get(key)
    }

    fn put(&mut self, key: BlobKey, data: &[u8]) -> Result<()> {
        self.as_mut().put(key, data)
    }

    fn test(&mut self, key: BlobKey) -> Result<bool> {
        self.as_mut().test(key)
    }

    fn remove(&mut self, key: BlobKey) -> Result<()> {
        self.as_mut().remove(key)
    }

    fn list(&mut self, kind: BlobType) -> Result<BlobIds<'_>> {
        self.as_mut().list(kind)
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}
