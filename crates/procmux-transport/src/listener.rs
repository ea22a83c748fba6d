use std::fmt;

use crate::endpoint::{Endpoint, TransportKind};
use crate::error::Result;
use crate::stream::IpcStream;
use crate::tcp::TcpLoopback;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener for whichever transport an [`Endpoint`] selects.
pub enum IpcListener {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Tcp(TcpLoopback),
}

impl IpcListener {
    /// Bind to `endpoint`.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Self::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(crate::error::TransportError::Unsupported("unix")),
            Endpoint::Tcp(addr) => Ok(Self::Tcp(TcpLoopback::bind(addr)?)),
        }
    }

    /// Accept the next incoming connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        match self {
            #[cfg(unix)]
            Self::Unix(socket) => socket.accept(),
            Self::Tcp(socket) => socket.accept(),
        }
    }

    /// The endpoint clients should dial. For TCP this carries the resolved
    /// port when the listener was bound to port `0`.
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            #[cfg(unix)]
            Self::Unix(socket) => Endpoint::unix(socket.path()),
            Self::Tcp(socket) => Endpoint::Tcp(socket.local_addr().to_string()),
        }
    }

    /// Transport backing this listener.
    pub fn kind(&self) -> TransportKind {
        match self {
            #[cfg(unix)]
            Self::Unix(_) => TransportKind::Unix,
            Self::Tcp(_) => TransportKind::Tcp,
        }
    }
}

impl fmt::Debug for IpcListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcListener")
            .field("endpoint", &self.local_endpoint().to_string())
            .finish()
    }
}

/// Dial `endpoint` (blocking).
pub fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
    match endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(crate::error::TransportError::Unsupported("unix")),
        Endpoint::Tcp(addr) => TcpLoopback::connect(addr),
    }
}
