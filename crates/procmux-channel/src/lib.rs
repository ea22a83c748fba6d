//! Channels: addressed, relaying conversation endpoints over one connection.
//!
//! A client [`Channel`] dials a hub and announces its id with a `Connect`
//! frame. The hub side of the connection (a server-role channel accepted by
//! [`ChannelListener`]) adopts that id, registers itself in the shared
//! [`ChannelRegistry`] and answers `ConnectAck`. From then on both sides can
//! send `Common` frames to each other, and `Relay` frames addressed to any
//! channel the hub knows about are forwarded there.
//!
//! Each channel runs one receive thread. Frames are handed to the channel's
//! [`Handler`]; handler failures are logged and never tear the connection
//! down, while protocol violations and I/O errors do.

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod registry;

pub use channel::{Channel, ChannelRole};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use handler::{Handler, HandlerError, MessageContext, QueueHandler, ReceivedFrame};
pub use listener::ChannelListener;
pub use registry::ChannelRegistry;
