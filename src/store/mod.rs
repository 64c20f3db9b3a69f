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

//! Transports for storing content-addressed blobs.
//!
//! This module provides low-level storage transports called backends. A backend stores opaque,
//! immutable blobs identified by a type and a content-derived ID, and doesn't have to worry about
//! encryption or integrity checking. Those features are implemented by [`Repository`].
//!
//! All backends implement the [`Backend`] trait and behave identically from the caller's point of
//! view. For each backend, there is a corresponding config type which implements [`OpenBackend`]:
//!
//! - [`LocalConfig`] opens a [`LocalBackend`] in a directory on the local filesystem.
//! - [`RemoteConfig`] opens a [`RemoteBackend`], which forwards every operation to a server
//!   process spawned through a remote shell. The server side is [`serve`].
//!
//! Most callers never name a transport directly. Instead, they parse a [`Location`] string, which
//! selects the transport and returns a boxed [`Backend`].
//!
//! [`Repository`]: crate::repo::Repository
//! [`Backend`]: crate::store::Backend
//! [`OpenBackend`]: crate::store::OpenBackend
//! [`LocalConfig`]: crate::store::LocalConfig
//! [`LocalBackend`]: crate::store::LocalBackend
//! [`RemoteConfig`]: crate::store::RemoteConfig
//! [`RemoteBackend`]: crate::store::RemoteBackend
//! [`serve`]: crate::store::serve
//! [`Location`]: crate::store::Location

pub use self::backend::{Backend, BlobId, BlobIds, BlobKey, BlobType};
pub use self::local::{LocalBackend, LocalConfig};
pub use self::location::Location;
pub use self::open_backend::OpenBackend;
#[cfg(feature = "backend-remote")]
pub use self::remote::serve;
#[cfg(all(unix, feature = "backend-remote"))]
pub use self::remote::{
    RemoteBackend, RemoteConfig, DEFAULT_PROGRAM, DEFAULT_SERVER_COMMAND, DEFAULT_TIMEOUT,
};

mod backend;
mod local;
mod location;
mod open_backend;
mod remote;
