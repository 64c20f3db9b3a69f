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

use std::sync::Once;

// A synchronization primitive for global initialization.
static INIT: Once = Once::new();

/// Initialize the environment for this crate.
///
/// This initializes libsodium, which is used for key derivation and encryption. Every function in
/// this crate which needs it calls this, so calling it yourself is optional. This function can be
/// called more than once.
///
/// # Panics
/// - libsodium could not be initialized.
pub fn init() {
    INIT.call_once(|| {
        sodiumoxide::init().expect("Failed to initialize libsodium.");
    });
}
