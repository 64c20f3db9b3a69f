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

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;

use super::backend::Backend;
use super::local::LocalConfig;
use super::open_backend::OpenBackend;
#[cfg(all(unix, feature = "backend-remote"))]
use super::remote::RemoteConfig;
use crate::{Error, Result};

/// A parsed location string which selects a transport.
///
/// A location is either a bare filesystem path, which selects the local transport, or
/// `scheme://[user@]host[:port]/path`, which selects the remote transport whatever the scheme is.
/// The `path` of a remote location has its leading `/` stripped, so `sftp://host/repo` names
/// `repo` relative to the login directory and `sftp://host//srv/repo` names the absolute path
/// `/srv/repo`. The user and the path are percent-decoded.
///
/// A `Location` implements [`OpenBackend`], which returns a boxed [`Backend`] so that callers
/// never need to know which transport they are using.
///
/// [`OpenBackend`]: crate::store::OpenBackend
/// [`Backend`]: crate::store::Backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A directory on the local filesystem.
    Local(LocalConfig),

    /// A directory on a remote host.
    #[cfg(all(unix, feature = "backend-remote"))]
    Remote(RemoteConfig),
}

impl Location {
    /// Bound every request to a remote location by `timeout`.
    ///
    /// This has no effect on local locations.
    #[cfg_attr(
        not(all(unix, feature = "backend-remote")),
        allow(unused_variables)
    )]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match self {
            #[cfg(all(unix, feature = "backend-remote"))]
            Location::Remote(mut config) => {
                config.timeout = timeout;
                Location::Remote(config)
            }
            other => other,
        }
    }

    /// Whether this location selects the local transport.
    pub fn is_local(&self) -> bool {
        matches!(self, Location::Local(_))
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidLocation(message.into())
}

/// Percent-decode the `part` of a location named `name`.
fn decode(part: &str, name: &str) -> Result<String> {
    percent_decode_str(part)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| invalid(format!("the {} is not valid UTF-8 once decoded", name)))
}

/// Split `[user@]host[:port]` into its parts.
fn parse_authority(authority: &str) -> Result<(Option<String>, String, Option<u16>)> {
    let (user, host_port) = match authority.rfind('@') {
        Some(index) => (Some(decode(&authority[..index], "user")?), &authority[index + 1..]),
        None => (None, authority),
    };

    if user.as_deref() == Some("") {
        return Err(invalid("the user is empty"));
    }

    let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
        // An IPv6 address.
        let end = bracketed
            .find(']')
            .ok_or_else(|| invalid("an IPv6 address is missing its closing bracket"))?;
        let rest = &bracketed[end + 1..];
        let port = match rest.strip_prefix(':') {
            Some(port) => Some(port),
            None if rest.is_empty() => None,
            None => return Err(invalid(format!("unexpected '{}' after the host", rest))),
        };
        (&bracketed[..end], port)
    } else {
        match host_port.rfind(':') {
            Some(index) => (&host_port[..index], Some(&host_port[index + 1..])),
            None => (host_port, None),
        }
    };

    if host.is_empty() {
        return Err(invalid("the host is empty"));
    }
    if host.starts_with('-') {
        return Err(invalid(format!("invalid host '{}'", host)));
    }

    let port = match port {
        Some(port) => match port.parse::<u16>() {
            Ok(number) if number != 0 => Some(number),
            _ => return Err(invalid(format!("invalid port '{}'", port))),
        },
        None => None,
    };

    Ok((user, host.to_string(), port))
}

#[cfg(all(unix, feature = "backend-remote"))]
fn remote_location(user: Option<String>, host: String, port: Option<u16>, path: &str) -> Result<Location> {
    let mut config = RemoteConfig::ssh(host, path);
    config.user = user;
    config.port = port;
    Ok(Location::Remote(config))
}

#[cfg(not(all(unix, feature = "backend-remote")))]
fn remote_location(_: Option<String>, _: String, _: Option<u16>, _: &str) -> Result<Location> {
    Err(invalid("remote locations are not supported by this build"))
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(invalid("the location is empty"));
        }

        let (scheme, rest) = match s.find("://") {
            Some(index) => (&s[..index], &s[index + 3..]),
            None => return Ok(Location::Local(LocalConfig::new(s))),
        };

        // Something like `./backups://old` is a path, not a URL.
        let is_scheme = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !is_scheme {
            return Ok(Location::Local(LocalConfig::new(s)));
        }

        let (authority, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index + 1..]),
            None => (rest, ""),
        };
        if path.is_empty() {
            return Err(invalid("the path is empty"));
        }

        let (user, host, port) = parse_authority(authority)?;
        remote_location(user, host, port, &decode(path, "path")?)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(config) => write!(f, "{}", config.path.display()),
            #[cfg(all(unix, feature = "backend-remote"))]
            Location::Remote(config) => {
                write!(f, "sftp://")?;
                if let Some(user) = &config.user {
                    write!(f, "{}@", user)?;
                }
                match config.host.as_deref() {
                    Some(host) if host.contains(':') => write!(f, "[{}]", host)?,
                    Some(host) => f.write_str(host)?,
                    None => f.write_str(&config.program)?,
                }
                if let Some(port) = config.port {
                    write!(f, ":{}", port)?;
                }
                write!(f, "/{}", config.path.display())
            }
        }
    }
}

impl OpenBackend for Location {
    type Backend = Box<dyn Backend>;

    fn create(&self) -> Result<Self::Backend> {
        match self {
            Location::Local(config) => Ok(Box::new(config.create()?)),
            #[cfg(all(unix, feature = "backend-remote"))]
            Location::Remote(config) => Ok(Box::new(config.create()?)),
        }
    }

    fn open(&self) -> Result<Self::Backend> {
        match self {
            Location::Local(config) => Ok(Box::new(config.open()?)),
            #[cfg(all(unix, feature = "backend-remote"))]
            Location::Remote(config) => Ok(Box::new(config.open()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/var/backups/repo")]
    #[case("relative/repo")]
    #[case("./backups://old")]
    #[case("3rd://not-a-scheme")]
    fn paths_without_a_scheme_are_local(#[case] location: &str) {
        let parsed: Location = location.parse().unwrap();
        assert_eq!(parsed, Location::Local(LocalConfig::new(location)));
    }

    #[rstest]
    #[case("")]
    #[case("sftp:///repo")]
    #[case("sftp://host")]
    #[case("sftp://host/")]
    #[case("sftp://@host/repo")]
    #[case("sftp://host:0/repo")]
    #[case("sftp://host:99999/repo")]
    #[case("sftp://host:port/repo")]
    #[case("sftp://[::1/repo")]
    #[case("sftp://-oProxyCommand=true/repo")]
    #[case("sftp://host/%ff")]
    fn malformed_locations_are_rejected(#[case] location: &str) {
        assert!(matches!(
            location.parse::<Location>(),
            Err(Error::InvalidLocation(_))
        ));
    }

    #[cfg(all(unix, feature = "backend-remote"))]
    #[rstest]
    #[case("sftp://host/repo", None, "host", None, "repo")]
    #[case("sftp://host//tmp/repo", None, "host", None, "/tmp/repo")]
    #[case("ssh://backup@host:2222/repo", Some("backup"), "host", Some(2222), "repo")]
    #[case("SFTP://[::1]:22/srv/repo", None, "::1", Some(22), "srv/repo")]
    #[case("rsh://host/repo", None, "host", None, "repo")]
    #[case("sftp://back%40up@host/my%20repo", Some("back@up"), "host", None, "my repo")]
    fn urls_are_remote(
        #[case] location: &str,
        #[case] user: Option<&str>,
        #[case] host: &str,
        #[case] port: Option<u16>,
        #[case] path: &str,
    ) {
        let config = match location.parse::<Location>().unwrap() {
            Location::Remote(config) => config,
            other => panic!("expected a remote location, got {:?}", other),
        };
        assert_eq!(config.user.as_deref(), user);
        assert_eq!(config.host.as_deref(), Some(host));
        assert_eq!(config.port, port);
        assert_eq!(config.path, PathBuf::from(path));
    }

    #[test]
    fn timeout_does_not_change_local_locations() {
        let location: Location = "/var/backups/repo".parse().unwrap();
        assert_eq!(location.clone().with_timeout(Duration::from_secs(3)), location);
    }

    #[cfg(all(unix, feature = "backend-remote"))]
    #[test]
    fn timeout_applies_to_remote_locations() {
        let location: Location = "sftp://host/repo".parse().unwrap();
        match location.with_timeout(Duration::from_secs(3)) {
            Location::Remote(config) => assert_eq!(config.timeout, Duration::from_secs(3)),
            other => panic!("expected a remote location, got {:?}", other),
        }
    }

    #[cfg(all(unix, feature = "backend-remote"))]
    #[test]
    fn remote_location_displays_as_url() {
        let location: Location = "ssh://backup@host:2222//srv/repo".parse().unwrap();
        assert_eq!(location.to_string(), "sftp://backup@host:2222//srv/repo");
    }
}
