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

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
#[cfg(all(unix, feature = "backend-remote"))]
use std::time::Duration;

use rstest::*;
use tempfile::TempDir;

use sealed_store::store::{LocalConfig, Location};
#[cfg(all(unix, feature = "backend-remote"))]
use sealed_store::store::RemoteConfig;

/// The name of the storage directory inside each temporary directory.
const STORE_DIRECTORY: &str = "store";

/// How long a remote request may take in tests.
#[cfg(all(unix, feature = "backend-remote"))]
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// A value which is tied to the lifetime of a temporary directory.
pub struct WithTempDir<T> {
    directory: TempDir,
    value: T,
}

impl<T> WithTempDir<T> {
    /// The path of the storage directory.
    pub fn store_path(&self) -> PathBuf {
        self.directory.path().join(STORE_DIRECTORY)
    }

    /// The storage directory as a location string.
    pub fn store_location(&self) -> String {
        self.store_path().to_string_lossy().into_owned()
    }
}

impl<T> Deref for WithTempDir<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for WithTempDir<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

/// A remote configuration which runs this crate's server binary directly for `path`.
#[cfg(all(unix, feature = "backend-remote"))]
pub fn local_server(path: &Path) -> RemoteConfig {
    let mut config =
        RemoteConfig::command(env!("CARGO_BIN_EXE_sealed-store-serve"), Vec::<String>::new(), path);
    config.timeout = REMOTE_TIMEOUT;
    config
}

/// A local location in a fresh temporary directory.
#[fixture]
pub fn local_location() -> WithTempDir<Location> {
    let directory = tempfile::tempdir().unwrap();
    let value = Location::Local(LocalConfig::new(directory.path().join(STORE_DIRECTORY)));
    WithTempDir { directory, value }
}

/// A remote location served from a fresh temporary directory.
#[cfg(all(unix, feature = "backend-remote"))]
#[fixture]
pub fn remote_location() -> WithTempDir<Location> {
    let directory = tempfile::tempdir().unwrap();
    let value = Location::Remote(local_server(&directory.path().join(STORE_DIRECTORY)));
    WithTempDir { directory, value }
}
