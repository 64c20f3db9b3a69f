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

//! The wire format spoken between a `RemoteBackend` and the server process.
//!
//! Every message is a MessagePack-encoded header frame followed by the payload, which is empty
//! unless the message carries blob contents. The payload is split into chunk frames of at most
//! `PAYLOAD_CHUNK_SIZE` bytes and terminated by an empty frame, so a blob of any size fits. Each
//! frame is prefixed with its length as a big-endian `u32`.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::{BlobId, BlobKey, BlobType};

/// The largest frame either side will accept.
pub const MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;

/// The size of the chunks a payload is split into.
pub const PAYLOAD_CHUNK_SIZE: usize = 1024 * 1024;

/// A request sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Create a new backend at `path` and bind the session to it.
    Create { path: PathBuf },

    /// Open the existing backend at `path` and bind the session to it.
    Open { path: PathBuf },

    Get(BlobKey),

    /// The blob contents are the payload.
    Put(BlobKey),

    Test(BlobKey),

    Remove(BlobKey),

    List(BlobType),
}

/// A response sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The request succeeded and there is nothing to return.
    Done,

    /// The blob contents are the payload.
    Data,

    Exists(bool),

    Ids(Vec<BlobId>),

    Failed(RemoteError),
}

impl Response {
    /// The name of this response for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Response::Done => "Done",
            Response::Data => "Data",
            Response::Exists(_) => "Exists",
            Response::Ids(_) => "Ids",
            Response::Failed(_) => "Failed",
        }
    }
}

/// An error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteError {
    AlreadyExists,
    NotFound,
    UnsupportedFormat,
    Closed,
    Store(String),
}

impl From<crate::Error> for RemoteError {
    fn from(error: crate::Error) -> Self {
        match error {
            crate::Error::AlreadyExists => RemoteError::AlreadyExists,
            crate::Error::NotFound => RemoteError::NotFound,
            crate::Error::UnsupportedFormat => RemoteError::UnsupportedFormat,
            crate::Error::Closed => RemoteError::Closed,
            other => RemoteError::Store(other.to_string()),
        }
    }
}

impl From<RemoteError> for crate::Error {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::AlreadyExists => crate::Error::AlreadyExists,
            RemoteError::NotFound => crate::Error::NotFound,
            RemoteError::UnsupportedFormat => crate::Error::UnsupportedFormat,
            RemoteError::Closed => crate::Error::Closed,
            RemoteError::Store(message) => {
                crate::Error::Store(anyhow::anyhow!("The remote backend failed: {}", message))
            }
        }
    }
}

fn write_frame(writer: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "The frame is too large."))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(bytes)
}

/// Read one frame, returning `None` if the stream ended cleanly before it started.
fn read_frame(reader: &mut impl Read, allow_eof: bool) -> io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        match reader.read(&mut len_bytes[filled..]) {
            Ok(0) if filled == 0 && allow_eof => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }

    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("A frame of {} bytes exceeds the limit.", len),
        ));
    }

    let mut buffer = vec![0u8; len as usize];
    reader.read_exact(&mut buffer)?;
    Ok(Some(buffer))
}

/// Write a `message` followed by its `payload` and flush the stream.
///
/// Nothing is written if the header is too large to be sent.
pub fn write_message<M: Serialize>(
    writer: &mut impl Write,
    message: &M,
    payload: &[u8],
) -> io::Result<()> {
    let header = rmp_serde::to_vec(message)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    write_frame(writer, &header)?;
    for chunk in payload.chunks(PAYLOAD_CHUNK_SIZE) {
        write_frame(writer, chunk)?;
    }
    write_frame(writer, &[])?;
    writer.flush()
}

/// Read chunk frames up to and including the empty terminating frame.
fn read_payload(reader: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    loop {
        match read_frame(reader, false)? {
            Some(chunk) if chunk.is_empty() => return Ok(payload),
            Some(chunk) => payload.extend_from_slice(&chunk),
            None => return Err(io::ErrorKind::UnexpectedEof.into()),
        }
    }
}

/// Read a message and its payload.
///
/// This returns `None` if the stream ended cleanly between two messages.
pub fn read_message<M: DeserializeOwned>(
    reader: &mut impl Read,
) -> io::Result<Option<(M, Vec<u8>)>> {
    let header = match read_frame(reader, true)? {
        Some(header) => header,
        None => return Ok(None),
    };
    let payload = read_payload(reader)?;
    let message = rmp_serde::from_slice(&header)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    Ok(Some((message, payload)))
}
