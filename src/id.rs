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

#![macro_use]

use thiserror::Error as DeriveError;

/// The number of bytes in a [`BlobId`] or [`RepoId`].
///
/// [`BlobId`]: crate::store::BlobId
/// [`RepoId`]: crate::repo::RepoId
pub const ID_SIZE: usize = 32;

/// An error returned when parsing an ID from its hex encoding fails.
#[derive(Debug, Clone, PartialEq, Eq, DeriveError)]
#[error("An ID must be {} lowercase hex characters.", ID_SIZE * 2)]
pub struct ParseIdError;

/// Decode a lowercase hex string into the bytes of an ID.
pub(crate) fn decode_hex(hex_str: &str) -> Result<[u8; ID_SIZE], ParseIdError> {
    // We only accept the canonical encoding so that every ID has exactly one file name.
    if hex_str.len() != ID_SIZE * 2 || hex_str.bytes().any(|byte| byte.is_ascii_uppercase()) {
        return Err(ParseIdError);
    }
    let mut bytes = [0u8; ID_SIZE];
    hex::decode_to_slice(hex_str, &mut bytes).map_err(|_| ParseIdError)?;
    Ok(bytes)
}

macro_rules! hex_id_type {
    {
        $(#[$meta:meta])*
        $name:ident
    } => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name([u8; crate::id::ID_SIZE]);

        impl $name {
            /// Construct a new instance which wraps the given `bytes`.
            pub const fn from_bytes(bytes: [u8; crate::id::ID_SIZE]) -> Self {
                $name(bytes)
            }

            /// The raw bytes of this ID.
            pub fn as_bytes(&self) -> &[u8; crate::id::ID_SIZE] {
                &self.0
            }

            /// The lowercase hex encoding of this ID.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::id::ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                crate::id::decode_hex(s).map($name)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(decode_hex("abcd"), Err(ParseIdError));
        assert_eq!(decode_hex(&"a".repeat(ID_SIZE * 2 + 2)), Err(ParseIdError));
    }

    #[test]
    fn decode_rejects_uppercase_and_non_hex() {
        assert_eq!(decode_hex(&"AB".repeat(ID_SIZE)), Err(ParseIdError));
        assert_eq!(decode_hex(&"zz".repeat(ID_SIZE)), Err(ParseIdError));
    }

    #[test]
    fn decode_accepts_canonical_hex() {
        let bytes = decode_hex(&"0f".repeat(ID_SIZE)).unwrap();
        assert_eq!(bytes, [0x0f; ID_SIZE]);
    }
}
