use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Listening TCP socket restricted to loopback interfaces.
pub struct TcpLoopback {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpLoopback {
    /// Bind to `host:port`. Port `0` picks a free port; see [`local_addr`].
    ///
    /// [`local_addr`]: TcpLoopback::local_addr
    pub fn bind(address: &str) -> Result<Self> {
        let addr = resolve_loopback(address)?;
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening on tcp loopback");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted tcp connection");
        IpcStream::from_tcp(stream)
    }

    /// Connect to a listening loopback socket (blocking).
    pub fn connect(address: &str) -> Result<IpcStream> {
        let addr = resolve_loopback(address)?;
        let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
            address: address.to_string(),
            source,
        })?;
        debug!(%addr, "connected to tcp loopback");
        IpcStream::from_tcp(stream)
    }

    /// The address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Resolve `address` and keep the first loopback candidate.
pub fn resolve_loopback(address: &str) -> Result<SocketAddr> {
    let candidates = address
        .to_socket_addrs()
        .map_err(|_| TransportError::InvalidEndpoint(address.to_string()))?;
    let mut saw_any = false;
    for candidate in candidates {
        saw_any = true;
        if candidate.ip().is_loopback() {
            return Ok(candidate);
        }
    }
    if saw_any {
        Err(TransportError::NotLoopback(address.to_string()))
    } else {
        Err(TransportError::InvalidEndpoint(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::endpoint::TransportKind;

    #[test]
    fn bind_accept_connect_on_ephemeral_port() {
        let listener = TcpLoopback::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        assert_ne!(listener.local_addr().port(), 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpLoopback::connect(&addr).unwrap();
            assert_eq!(client.kind(), TransportKind::Tcp);
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert!(server.peer_credentials().is_none());
        handle.join().unwrap();
    }

    #[test]
    fn rejects_non_loopback_address() {
        let result = resolve_loopback("192.0.2.10:7400");
        assert!(matches!(result, Err(TransportError::NotLoopback(_))));
    }

    #[test]
    fn localhost_resolves_to_loopback() {
        let addr = resolve_loopback("localhost:7400").unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 7400);
    }

    #[test]
    fn garbage_address_is_invalid() {
        let result = resolve_loopback("not an address");
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
    }
}
