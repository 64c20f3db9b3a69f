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

#![cfg(unix)]

use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::raw::c_int;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use super::protocol::{read_message, write_message, Request, Response};
use crate::store::{Backend, BlobId, BlobIds, BlobKey, BlobType, OpenBackend};
use crate::{Error, Result};

/// The remote-shell program used by [`RemoteConfig::ssh`].
pub const DEFAULT_PROGRAM: &str = "ssh";

/// The command run on the remote host by [`RemoteConfig::ssh`].
pub const DEFAULT_SERVER_COMMAND: &str = "sealed-store-serve";

/// The default bound on how long a single request may take.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long to wait for the server to exit after its input is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How often to check whether the server has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Writes to a pipe of at most this many bytes never block once it is writable.
const PIPE_CHUNK_SIZE: usize = 4096;

/// The most captured stderr included in an error message.
const MAX_STDERR_LEN: usize = 1024;

/// The configuration for a [`RemoteBackend`].
///
/// When `host` is `Some`, the session runs `program [-l user] [-p port] [args...] host
/// server_command`. When `host` is `None`, it runs `program [args...]` directly, which is useful
/// for running a server on the local machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// The remote-shell program to spawn.
    pub program: String,

    /// The host to connect to.
    pub host: Option<String>,

    /// The user to log in as.
    pub user: Option<String>,

    /// The port to connect to.
    pub port: Option<u16>,

    /// The path of the backend on the server.
    pub path: PathBuf,

    /// The command which starts the server on the remote host.
    pub server_command: String,

    /// Extra arguments passed to `program`.
    pub args: Vec<String>,

    /// The longest a single request may take before the session is abandoned.
    pub timeout: Duration,
}

impl RemoteConfig {
    /// A configuration which connects to `host` using `ssh`.
    pub fn ssh(host: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        RemoteConfig {
            program: DEFAULT_PROGRAM.to_string(),
            host: Some(host.into()),
            user: None,
            port: None,
            path: path.into(),
            server_command: DEFAULT_SERVER_COMMAND.to_string(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A configuration which runs the server `program` directly with the given `args`.
    pub fn command<I, S>(program: impl Into<String>, args: I, path: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RemoteConfig {
            program: program.into(),
            host: None,
            user: None,
            port: None,
            path: path.into(),
            server_command: DEFAULT_SERVER_COMMAND.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A human-readable description of the session for logs and errors.
    fn describe(&self) -> String {
        match &self.host {
            Some(host) => match &self.user {
                Some(user) => format!("{} {}@{}", self.program, user, host),
                None => format!("{} {}", self.program, host),
            },
            None => self.program.clone(),
        }
    }

    fn to_command(&self) -> Result<Command> {
        let mut command = Command::new(&self.program);
        if let Some(host) = &self.host {
            // Anything starting with a dash would be read as an option by the remote shell.
            if host.is_empty() || host.starts_with('-') {
                return Err(Error::InvalidLocation(format!("invalid host '{}'", host)));
            }
            if let Some(user) = &self.user {
                if user.is_empty() || user.starts_with('-') {
                    return Err(Error::InvalidLocation(format!("invalid user '{}'", user)));
                }
                command.arg("-l").arg(user);
            }
            if let Some(port) = self.port {
                command.arg("-p").arg(port.to_string());
            }
            command.args(&self.args).arg(host).arg(&self.server_command);
        } else {
            command.args(&self.args);
        }
        Ok(command)
    }

    /// Spawn the server and perform the `handshake`.
    fn connect(&self, handshake: Request) -> Result<RemoteBackend> {
        let description = self.describe();
        let mut command = self.to_command()?;

        let stderr_log = tempfile::tempfile().map_err(|error| {
            Error::ConnectionFailed(format!("could not capture the output of `{}`: {}", description, error))
        })?;
        let stderr_handle = stderr_log.try_clone().map_err(|error| {
            Error::ConnectionFailed(format!("could not capture the output of `{}`: {}", description, error))
        })?;

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .map_err(|error| match error.kind() {
                io::ErrorKind::NotFound => Error::ConnectionFailed(format!(
                    "remote shell program `{}` not found",
                    self.program
                )),
                _ => Error::ConnectionFailed(format!("could not start `{}`: {}", description, error)),
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                child.kill().ok();
                child.wait().ok();
                return Err(Error::ConnectionFailed(format!(
                    "could not attach to the standard streams of `{}`",
                    description
                )));
            }
        };

        info!("Started remote session `{}`.", description);

        let mut backend = RemoteBackend {
            child,
            stdin: Some(stdin),
            stdout,
            stderr_log,
            description,
            path: self.path.clone(),
            timeout: self.timeout,
            state: SessionState::Open,
        };

        match backend.transfer(&handshake, &[]) {
            Ok((Response::Done, _)) => Ok(backend),
            Ok((Response::Failed(error), _)) => Err(error.into()),
            Ok((response, _)) => Err(Error::ConnectionFailed(format!(
                "`{}` answered the handshake with an unexpected '{}' response",
                backend.description,
                response.name()
            ))),
            Err(error) => Err(backend.connection_failure(error)),
        }
    }
}

impl OpenBackend for RemoteConfig {
    type Backend = RemoteBackend;

    fn create(&self) -> Result<Self::Backend> {
        self.connect(Request::Create {
            path: self.path.clone(),
        })
    }

    fn open(&self) -> Result<Self::Backend> {
        self.connect(Request::Open {
            path: self.path.clone(),
        })
    }
}

/// A stream wrapper which fails with `TimedOut` once `deadline` passes.
struct Deadline<'a, T> {
    inner: &'a mut T,
    deadline: Instant,
}

impl<'a, T: AsRawFd> Deadline<'a, T> {
    fn new(inner: &'a mut T, deadline: Instant) -> Self {
        Deadline { inner, deadline }
    }

    /// Block until the stream is ready for `flags` or the deadline passes.
    fn wait(&self, flags: PollFlags) -> io::Result<()> {
        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "The remote backend did not respond in time.",
                ));
            }
            let millis = c_int::try_from(remaining.as_millis())
                .unwrap_or(c_int::MAX)
                .max(1);
            let mut fds = [PollFd::new(self.inner.as_raw_fd(), flags)];
            match poll(&mut fds, millis) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => return Ok(()),
                Err(errno) => return Err(io::Error::from(errno)),
            }
        }
    }
}

impl<T: AsRawFd + Read> Read for Deadline<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wait(PollFlags::POLLIN)?;
        self.inner.read(buf)
    }
}

impl<T: AsRawFd + Write> Write for Deadline<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.wait(PollFlags::POLLOUT)?;
        let len = buf.len().min(PIPE_CHUNK_SIZE);
        self.inner.write(&buf[..len])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Broken,
    Closed,
}

/// A [`Backend`] which forwards every operation to a server process over its standard streams.
///
/// Requests are strictly serialized: each response is read before the next request is written.
/// Every exchange is bounded by the configured timeout. Once an exchange times out or the channel
/// closes, the session is broken and every later operation fails immediately.
///
/// [`Backend`]: crate::store::Backend
pub struct RemoteBackend {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    stderr_log: File,
    description: String,
    path: PathBuf,
    timeout: Duration,
    state: SessionState,
}

impl RemoteBackend {
    /// Send `request` with `payload` and wait for the response.
    fn exchange(&mut self, request: &Request, payload: &[u8]) -> Result<(Response, Vec<u8>)> {
        match self.state {
            SessionState::Open => {}
            SessionState::Broken => {
                return Err(Error::Store(anyhow!(
                    "The session with `{}` was lost by an earlier request.",
                    self.description
                )))
            }
            SessionState::Closed => return Err(Error::Closed),
        }

        match self.transfer(request, payload) {
            Ok(response) => Ok(response),
            Err(error) => {
                self.state = SessionState::Broken;
                let message = match error.kind() {
                    io::ErrorKind::TimedOut => format!(
                        "Request to `{}` timed out after {:?}.",
                        self.description, self.timeout
                    ),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => {
                        format!("The connection to `{}` closed.", self.description)
                    }
                    _ => format!("The exchange with `{}` failed.", self.description),
                };
                warn!("{}", message);
                Err(Error::Store(anyhow::Error::new(error).context(message)))
            }
        }
    }

    /// Write `request` with `payload` and read the response within the timeout.
    fn transfer(&mut self, request: &Request, payload: &[u8]) -> io::Result<(Response, Vec<u8>)> {
        let deadline = Instant::now() + self.timeout;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;

        write_message(&mut Deadline::new(stdin, deadline), request, payload)?;
        read_message::<Response>(&mut Deadline::new(&mut self.stdout, deadline))?
            .ok_or_else(|| io::ErrorKind::UnexpectedEof.into())
    }

    /// Convert a response which doesn't match the request into an error.
    fn unexpected(&mut self, response: Response) -> Error {
        match response {
            Response::Failed(error) => error.into(),
            other => {
                self.state = SessionState::Broken;
                Error::Store(anyhow!(
                    "`{}` sent an unexpected '{}' response.",
                    self.description,
                    other.name()
                ))
            }
        }
    }

    /// Wait up to `limit` for the server to exit.
    fn wait_for_exit(&mut self, limit: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + limit;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
                Ok(None) | Err(_) => return None,
            }
        }
    }

    fn kill(&mut self) {
        warn!("Killing the server process of `{}`.", self.description);
        self.child.kill().ok();
        self.child.wait().ok();
    }

    /// The tail of what the server wrote to stderr.
    fn captured_stderr(&mut self) -> String {
        let mut output = Vec::new();
        if self.stderr_log.seek(SeekFrom::Start(0)).is_err()
            || self.stderr_log.read_to_end(&mut output).is_err()
        {
            return String::new();
        }
        let start = output.len().saturating_sub(MAX_STDERR_LEN);
        String::from_utf8_lossy(&output[start..]).trim().to_string()
    }

    /// Shut down a session whose handshake failed with `error` and explain why.
    fn connection_failure(&mut self, error: io::Error) -> Error {
        self.state = SessionState::Closed;
        drop(self.stdin.take());

        // A closed or silent channel is explained by the exit status instead.
        let detail = match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => {
                None
            }
            _ => Some(error.to_string()),
        };

        let cause = match self.wait_for_exit(SHUTDOWN_GRACE.min(self.timeout)) {
            Some(status) => match status.code() {
                Some(255) => format!(
                    "`{}` could not connect to or authenticate with the host",
                    self.description
                ),
                Some(126) | Some(127) => format!(
                    "the remote command was not found by `{}`",
                    self.description
                ),
                Some(code) => format!("`{}` exited with status {}", self.description, code),
                None => format!("`{}` was terminated by a signal", self.description),
            },
            None if detail.is_none() => {
                self.kill();
                format!(
                    "`{}` did not answer within {:?}",
                    self.description, self.timeout
                )
            }
            None => {
                self.kill();
                format!("`{}` did not answer the handshake", self.description)
            }
        };
        let cause = match detail {
            Some(detail) => format!("{}; the handshake failed: {}", cause, detail),
            None => cause,
        };

        let stderr = self.captured_stderr();
        if stderr.is_empty() {
            Error::ConnectionFailed(cause)
        } else {
            Error::ConnectionFailed(format!("{}: {}", cause, stderr))
        }
    }
}

impl Debug for RemoteBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("session", &self.description)
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Backend for RemoteBackend {
    fn get(&mut self, key: BlobKey) -> Result<Vec<u8>> {
        debug!("Getting {} from `{}`.", key, self.description);
        match self.exchange(&Request::Get(key), &[])? {
            (Response::Data, payload) => Ok(payload),
            (response, _) => Err(self.unexpected(response)),
        }
    }

    fn put(&mut self, key: BlobKey, data: &[u8]) -> Result<()> {
        debug!("Putting {} to `{}`.", key, self.description);
        match self.exchange(&Request::Put(key), data)? {
            (Response::Done, _) => Ok(()),
            (response, _) => Err(self.unexpected(response)),
        }
    }

    fn test(&mut self, key: BlobKey) -> Result<bool> {
        match self.exchange(&Request::Test(key), &[])? {
            (Response::Exists(exists), _) => Ok(exists),
            (response, _) => Err(self.unexpected(response)),
        }
    }

    fn remove(&mut self, key: BlobKey) -> Result<()> {
        debug!("Removing {} from `{}`.", key, self.description);
        match self.exchange(&Request::Remove(key), &[])? {
            (Response::Done, _) => Ok(()),
            (response, _) => Err(self.unexpected(response)),
        }
    }

    fn list(&mut self, kind: BlobType) -> Result<BlobIds<'_>> {
        match self.exchange(&Request::List(kind), &[])? {
            (Response::Ids(ids), _) => Ok(Box::new(ids.into_iter().map(Ok::<BlobId, Error>))),
            (response, _) => Err(self.unexpected(response)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;

        // The server exits once its input reaches EOF.
        drop(self.stdin.take());

        match self.wait_for_exit(SHUTDOWN_GRACE.min(self.timeout)) {
            Some(status) if status.success() => {
                info!("Closed remote session `{}`.", self.description);
                Ok(())
            }
            Some(status) => {
                let stderr = self.captured_stderr();
                Err(Error::Store(anyhow!(
                    "`{}` exited with {}: {}",
                    self.description,
                    status,
                    stderr
                )))
            }
            None => {
                self.kill();
                Ok(())
            }
        }
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            self.close().ok();
        }
        if let Ok(None) = self.child.try_wait() {
            self.kill();
        }
    }
}
