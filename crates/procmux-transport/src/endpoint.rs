use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::TransportError;

const UNIX_PREFIX: &str = "unix:";
const TCP_PREFIX: &str = "tcp:";

/// Which transport an endpoint uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Unix,
    Tcp,
}

impl TransportKind {
    /// Transport name for diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Unix => "unix-domain-socket",
            TransportKind::Tcp => "tcp-loopback",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a hub, either a Unix socket path or a loopback `host:port`.
///
/// Accepted textual forms:
/// - `unix:/run/app/hub.sock`
/// - `tcp:localhost:7400`
/// - `127.0.0.1:7400` (a trailing numeric port selects TCP)
/// - `/run/app/hub.sock` (anything else is treated as a path)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    /// Build a Unix socket endpoint.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self::Unix(path.as_ref().to_path_buf())
    }

    /// Build a TCP endpoint from host and port.
    pub fn tcp(host: &str, port: u16) -> Self {
        Self::Tcp(format!("{host}:{port}"))
    }

    /// The transport this endpoint selects.
    pub fn kind(&self) -> TransportKind {
        match self {
            Endpoint::Unix(_) => TransportKind::Unix,
            Endpoint::Tcp(_) => TransportKind::Tcp,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "{TCP_PREFIX}{addr}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(input.to_string()));
        }

        if let Some(path) = input.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(input.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if let Some(addr) = input.strip_prefix(TCP_PREFIX) {
            return parse_host_port(addr)
                .map(|_| Self::Tcp(addr.to_string()))
                .ok_or_else(|| TransportError::InvalidEndpoint(input.to_string()));
        }

        if !input.contains('/') && parse_host_port(input).is_some() {
            return Ok(Self::Tcp(input.to_string()));
        }

        Ok(Self::Unix(PathBuf::from(input)))
    }
}

fn parse_host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port = port.parse::<u16>().ok()?;
    Some((host, port))
}
