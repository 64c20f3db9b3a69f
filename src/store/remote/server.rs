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

use std::io::{Read, Write};

use anyhow::anyhow;
use log::{debug, info};

use super::protocol::{read_message, write_message, RemoteError, Request, Response};
use crate::store::{Backend, LocalBackend, LocalConfig, OpenBackend};
use crate::{Error, Result};

/// The server's half of a session.
#[derive(Debug, Default)]
struct Session {
    backend: Option<LocalBackend>,
}

impl Session {
    fn bind(&mut self, config: LocalConfig, create: bool) -> Result<()> {
        if self.backend.is_some() {
            return Err(Error::Store(anyhow!("The session is already bound to a backend.")));
        }
        let backend = if create {
            config.create()?
        } else {
            config.open()?
        };
        info!("Serving the backend at '{}'.", config.path.display());
        self.backend = Some(backend);
        Ok(())
    }

    fn backend(&mut self) -> Result<&mut LocalBackend> {
        self.backend
            .as_mut()
            .ok_or_else(|| Error::Store(anyhow!("The session is not bound to a backend.")))
    }

    fn dispatch(&mut self, request: Request, payload: Vec<u8>) -> Result<(Response, Vec<u8>)> {
        match request {
            Request::Create { path } => {
                self.bind(LocalConfig::new(path), true)?;
                Ok((Response::Done, Vec::new()))
            }
            Request::Open { path } => {
                self.bind(LocalConfig::new(path), false)?;
                Ok((Response::Done, Vec::new()))
            }
            Request::Get(key) => Ok((Response::Data, self.backend()?.get(key)?)),
            Request::Put(key) => {
                self.backend()?.put(key, &payload)?;
                Ok((Response::Done, Vec::new()))
            }
            Request::Test(key) => Ok((Response::Exists(self.backend()?.test(key)?), Vec::new())),
            Request::Remove(key) => {
                self.backend()?.remove(key)?;
                Ok((Response::Done, Vec::new()))
            }
            Request::List(kind) => {
                let ids = self.backend()?.list(kind)?.collect::<Result<Vec<_>>>()?;
                Ok((Response::Ids(ids), Vec::new()))
            }
        }
    }

    /// Answer a single request, turning failures into a response.
    fn handle(&mut self, request: Request, payload: Vec<u8>) -> (Response, Vec<u8>) {
        debug!("Handling {:?}.", request);
        self.dispatch(request, payload).unwrap_or_else(|error| {
            debug!("Request failed: {}", error);
            (Response::Failed(RemoteError::from(error)), Vec::new())
        })
    }

    fn close(&mut self) -> Result<()> {
        match self.backend.as_mut() {
            Some(backend) => backend.close(),
            None => Ok(()),
        }
    }
}

/// Serve requests read from `input`, writing responses to `output`.
///
/// This is the server half of [`RemoteBackend`]. It answers requests one at a time against a
/// [`LocalBackend`] named by the first request of the session, and returns `Ok` once `input`
/// reaches EOF between two requests.
///
/// # Errors
/// - `Error::Store`: A request could not be read or a response could not be written.
///
/// [`RemoteBackend`]: crate::store::RemoteBackend
/// [`LocalBackend`]: crate::store::LocalBackend
pub fn serve(mut input: impl Read, mut output: impl Write) -> Result<()> {
    let mut session = Session::default();

    while let Some((request, payload)) = read_message::<Request>(&mut input)
        .map_err(|error| Error::Store(anyhow::Error::new(error).context("Could not read a request.")))?
    {
        let (response, data) = session.handle(request, payload);
        write_message(&mut output, &response, &data).map_err(|error| {
            Error::Store(anyhow::Error::new(error).context("Could not write a response."))
        })?;
    }

    info!("The client closed the session.");
    session.close()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::tempdir;

    use super::*;
    use crate::store::{BlobId, BlobKey, BlobType};

    fn run(requests: &[(Request, Vec<u8>)]) -> Vec<(Response, Vec<u8>)> {
        let mut input = Vec::new();
        for (request, payload) in requests {
            write_message(&mut input, request, payload).unwrap();
        }

        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();

        let mut reader = Cursor::new(output);
        let mut responses = Vec::new();
        while let Some(response) = read_message::<Response>(&mut reader).unwrap() {
            responses.push(response);
        }
        responses
    }

    #[test]
    fn serves_a_session() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("store");
        let key = BlobKey::Data(BlobId::hash(b"Data"));

        let responses = run(&[
            (Request::Create { path }, Vec::new()),
            (Request::Put(key), b"Data".to_vec()),
            (Request::Get(key), Vec::new()),
            (Request::List(BlobType::Data), Vec::new()),
        ]);

        assert_eq!(
            responses,
            vec![
                (Response::Done, Vec::new()),
                (Response::Done, Vec::new()),
                (Response::Data, b"Data".to_vec()),
                (Response::Ids(vec![BlobId::hash(b"Data")]), Vec::new()),
            ]
        );
    }

    #[test]
    fn failures_are_reported_as_responses() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("missing");
        let key = BlobKey::Key(BlobId::hash(b"Key"));

        let responses = run(&[
            (Request::Open { path }, Vec::new()),
            (Request::Test(key), Vec::new()),
        ]);

        assert_eq!(
            responses[0],
            (Response::Failed(RemoteError::NotFound), Vec::new())
        );
        assert!(matches!(
            responses[1],
            (Response::Failed(RemoteError::Store(_)), _)
        ));
    }

    #[test]
    fn empty_input_ends_cleanly() {
        let mut output = Vec::new();
        serve(Cursor::new(Vec::new()), &mut output).unwrap();
        assert!(output.is_empty());
    }
}
