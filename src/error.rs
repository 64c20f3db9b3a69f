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

use std::io;
use std::result;

use thiserror::Error as DeriveError;

/// The error type for operations with a repository or a backend.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// A resource already exists.
    #[error("A resource already exists.")]
    AlreadyExists,

    /// A resource was not found.
    #[error("A resource was not found.")]
    NotFound,

    /// A connection to the backend could not be established.
    #[error("Could not connect to the backend: {0}")]
    ConnectionFailed(String),

    /// The location string could not be parsed.
    #[error("The location is invalid: {0}")]
    InvalidLocation(String),

    /// None of the key records in the repository could be decrypted with the provided password.
    #[error("The provided password was invalid.")]
    Password,

    /// The repository is corrupt.
    #[error("The repository is corrupt.")]
    Corrupt,

    /// The key record is being used by the current session and cannot be removed.
    #[error("The key record is in use.")]
    KeyInUse,

    /// This storage format is not supported by this version of the library.
    #[error("This storage format is not supported by this version of the library.")]
    UnsupportedFormat,

    /// The backend has been closed.
    #[error("The backend has been closed.")]
    Closed,

    /// An error occurred with the storage medium.
    #[error("{0:#}")]
    Store(anyhow::Error),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Store(anyhow::Error::from(error))
    }
}

/// The result type for operations with a repository or a backend.
pub type Result<T> = result::Result<T, Error>;
