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

use crate::store::Backend;

/// A value which can be used to create or open a [`Backend`].
///
/// [`Backend`]: crate::store::Backend
pub trait OpenBackend {
    /// The type of `Backend` which this value can be used to open.
    type Backend: Backend + 'static;

    /// Initialize empty storage and return a backend bound to it.
    ///
    /// # Errors
    /// - `Error::AlreadyExists`: Storage already exists at this location.
    /// - `Error::ConnectionFailed`: The transport could not be established.
    /// - `Error::Store`: An error occurred with the storage medium.
    fn create(&self) -> crate::Result<Self::Backend>;

    /// Return a backend bound to existing storage.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no recognizable storage at this location.
    /// - `Error::UnsupportedFormat`: The storage is an unsupported format.
    /// - `Error::ConnectionFailed`: The transport could not be established.
    /// - `Error::Store`: An error occurred with the storage medium.
    fn open(&self) -> crate::Result<Self::Backend>;
}
