//! Stream transports for procmux.
//!
//! Two local transports are supported:
//! - Unix domain sockets (filesystem paths)
//! - TCP restricted to loopback addresses
//!
//! Both produce an [`IpcStream`], the byte stream every higher layer reads
//! frames from. Which one a deployment uses is decided by the [`Endpoint`]
//! it is configured with.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Endpoint, TransportKind};
pub use error::{Result, TransportError};
pub use listener::{connect, IpcListener};
pub use stream::IpcStream;
pub use tcp::TcpLoopback;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
