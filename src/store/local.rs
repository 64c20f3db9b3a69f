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

use std::fs::{self, create_dir_all, read_dir, remove_file, DirEntry, File};
use std::io::{self, Read, Write};
use std::iter;
use std::path::{Path, PathBuf};

use hex_literal::hex;
use log::{debug, info};
use tempfile::NamedTempFile;
use uuid::Uuid;

use super::backend::{Backend, BlobId, BlobIds, BlobKey, BlobType};
use super::open_backend::OpenBackend;

/// A UUID which acts as the version ID of the local layout format.
const CURRENT_VERSION: Uuid = Uuid::from_bytes(hex!("5d0a3c1e 4f6b 11ed 9c21 2b0f7e4a8d13"));

// The names of top-level files in the backend.
const STAGING_DIRECTORY: &str = "tmp";
const VERSION_FILE: &str = "version";
const CONFIG_FILE: &str = "config";

fn type_path(kind: BlobType) -> PathBuf {
    PathBuf::from(kind.name())
}

fn blob_path(key: BlobKey) -> PathBuf {
    match (key.kind(), key.id()) {
        (Some(BlobType::Data), Some(id)) => {
            let hex = id.to_hex();
            type_path(BlobType::Data).join(&hex[..2]).join(&hex)
        }
        (Some(kind), Some(id)) => type_path(kind).join(id.to_hex()),
        _ => PathBuf::from(CONFIG_FILE),
    }
}

/// Wrap an I/O `error` which happened while performing `action` on `path`.
fn store_error(error: io::Error, action: &str, path: &Path) -> crate::Error {
    crate::Error::Store(
        anyhow::Error::new(error).context(format!("Could not {} '{}'.", action, path.display())),
    )
}

/// The configuration for opening a [`LocalBackend`].
///
/// [`LocalBackend`]: crate::store::LocalBackend
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LocalConfig {
    /// The path of the backend's root directory.
    pub path: PathBuf,
}

impl LocalConfig {
    /// Return a config for a backend rooted at the given `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalConfig { path: path.into() }
    }
}

impl OpenBackend for LocalConfig {
    type Backend = LocalBackend;

    fn create(&self) -> crate::Result<Self::Backend> {
        let version_path = self.path.join(VERSION_FILE);
        if version_path.exists() {
            return Err(crate::Error::AlreadyExists);
        }

        let mut directories = vec![self.path.clone(), self.path.join(STAGING_DIRECTORY)];
        directories.extend(BlobType::ALL.iter().map(|kind| self.path.join(type_path(*kind))));
        for directory in &directories {
            create_dir_all(directory)
                .map_err(|error| store_error(error, "create directory", directory))?;
        }

        // Write the version ID file. We do this last because this signifies that the layout is
        // done being created. Linking it without clobbering means that only one of two concurrent
        // `create` calls can succeed.
        let mut version_file = NamedTempFile::new_in(self.path.join(STAGING_DIRECTORY))
            .map_err(|error| store_error(error, "create a file in", &self.path))?;
        version_file
            .write_all(CURRENT_VERSION.as_hyphenated().to_string().as_bytes())
            .map_err(|error| store_error(error, "write", version_file.path()))?;
        match version_file.persist_noclobber(&version_path) {
            Ok(_) => {}
            Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(crate::Error::AlreadyExists)
            }
            Err(error) => return Err(store_error(error.error, "write", &version_path)),
        }

        info!("Created local backend at '{}'.", self.path.display());

        Ok(LocalBackend {
            path: self.path.clone(),
            closed: false,
        })
    }

    fn open(&self) -> crate::Result<Self::Backend> {
        let version_path = self.path.join(VERSION_FILE);

        // Read the version ID file.
        let mut version_file = match File::open(&version_path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(crate::Error::NotFound)
            }
            Err(error) => return Err(store_error(error, "open", &version_path)),
        };
        let mut version_id = String::new();
        version_file
            .read_to_string(&mut version_id)
            .map_err(|error| store_error(error, "read", &version_path))?;

        // Verify the version ID.
        match Uuid::parse_str(version_id.trim()) {
            Ok(version) if version == CURRENT_VERSION => {}
            _ => return Err(crate::Error::UnsupportedFormat),
        }

        debug!("Opened local backend at '{}'.", self.path.display());

        Ok(LocalBackend {
            path: self.path.clone(),
            closed: false,
        })
    }
}

/// A `Backend` which stores blobs in a directory in the local file system.
///
/// Each blob type has its own sub-directory and each blob is a file named by the hex encoding of
/// its ID. Blobs are written to a staging directory first and then atomically linked into place,
/// so a partially written blob is never visible.
///
/// You can use [`LocalConfig`] to open a backend of this type.
///
/// [`LocalConfig`]: crate::store::LocalConfig
#[derive(Debug)]
pub struct LocalBackend {
    /// The path of the backend's root directory.
    path: PathBuf,

    /// Whether `close` has been called.
    closed: bool,
}

impl LocalBackend {
    /// Return the path where a blob with the given `key` is stored.
    fn blob_path(&self, key: BlobKey) -> PathBuf {
        self.path.join(blob_path(key))
    }

    /// Return an error if this backend has been closed.
    fn check_open(&self) -> crate::Result<()> {
        if self.closed {
            Err(crate::Error::Closed)
        } else {
            Ok(())
        }
    }
}

/// Return the ID in the name of a directory entry, or `None` if it isn't a blob.
fn entry_id(entry: &DirEntry) -> Option<BlobId> {
    entry.file_name().to_str()?.parse().ok()
}

impl Backend for LocalBackend {
    fn get(&mut self, key: BlobKey) -> crate::Result<Vec<u8>> {
        self.check_open()?;
        let path = self.blob_path(key);

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(crate::Error::NotFound)
            }
            Err(error) => return Err(store_error(error, "open", &path)),
        };
        let size = file.metadata().map(|metadata| metadata.len()).unwrap_or(0);
        let mut buffer = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buffer)
            .map_err(|error| store_error(error, "read", &path))?;

        debug!("Read {} bytes from '{}'.", buffer.len(), key);
        Ok(buffer)
    }

    fn put(&mut self, key: BlobKey, data: &[u8]) -> crate::Result<()> {
        self.check_open()?;
        let path = self.blob_path(key);

        if path.exists() {
            debug!("Blob '{}' is already stored.", key);
            return Ok(());
        }

        // If this is the first blob in its sub-directory, the directory needs to be created.
        if let Some(parent) = path.parent() {
            create_dir_all(parent).map_err(|error| store_error(error, "create directory", parent))?;
        }

        // Write to a staging file and then atomically move it to its final destination.
        let staging_directory = self.path.join(STAGING_DIRECTORY);
        let mut staging_file = NamedTempFile::new_in(&staging_directory)
            .map_err(|error| store_error(error, "create a file in", &staging_directory))?;
        staging_file
            .write_all(data)
            .and_then(|_| staging_file.as_file().sync_all())
            .map_err(|error| store_error(error, "write", staging_file.path()))?;

        match staging_file.persist_noclobber(&path) {
            Ok(_) => {
                debug!("Wrote {} bytes to '{}'.", data.len(), key);
                Ok(())
            }
            // Another writer stored the same content first.
            Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(error) => Err(store_error(error.error, "write", &path)),
        }
    }

    fn test(&mut self, key: BlobKey) -> crate::Result<bool> {
        self.check_open()?;
        let path = self.blob_path(key);

        match fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(store_error(error, "stat", &path)),
        }
    }

    fn remove(&mut self, key: BlobKey) -> crate::Result<()> {
        self.check_open()?;
        let path = self.blob_path(key);

        match remove_file(&path) {
            Ok(()) => {
                debug!("Removed '{}'.", key);
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Err(crate::Error::NotFound),
            Err(error) => Err(store_error(error, "remove", &path)),
        }
    }

    fn list(&mut self, kind: BlobType) -> crate::Result<BlobIds<'_>> {
        self.check_open()?;
        let type_directory = self.path.join(type_path(kind));
        let entries = read_dir(&type_directory)
            .map_err(|error| store_error(error, "list", &type_directory))?;

        let files: Box<dyn Iterator<Item = io::Result<DirEntry>>> = match kind {
            // Data blobs are spread over sub-directories named by the first byte of their ID.
            BlobType::Data => Box::new(entries.flat_map(|entry| {
                let inner: Box<dyn Iterator<Item = io::Result<DirEntry>>> = match entry {
                    Ok(entry) if entry.path().is_dir() => match read_dir(entry.path()) {
                        Ok(blobs) => Box::new(blobs),
                        Err(error) => Box::new(iter::once(Err(error))),
                    },
                    Ok(_) => Box::new(iter::empty()),
                    Err(error) => Box::new(iter::once(Err(error))),
                };
                inner
            })),
            _ => Box::new(entries),
        };

        Ok(Box::new(files.filter_map(move |entry| match entry {
            Ok(entry) => entry_id(&entry).map(Ok),
            Err(error) => Some(Err(store_error(error, "list", &type_directory))),
        })))
    }

    fn close(&mut self) -> crate::Result<()> {
        if !self.closed {
            self.closed = true;
            debug!("Closed local backend at '{}'.", self.path.display());
        }
        Ok(())
    }
}
