//! Multiplexed process-to-process messaging.
//!
//! procmux connects a coordinating process and its satellite processes over
//! Unix domain sockets or TCP loopback, multiplexes addressed channels over
//! each connection, relays frames between channels through a hub, and carries
//! structured arguments in named process messages.
//!
//! # Crate Structure
//!
//! - [`value`]: Structured argument values and their binary encoding
//! - [`transport`]: Endpoints, Unix domain sockets and TCP loopback streams
//! - [`frame`]: Typed, addressed, length-prefixed frames
//! - [`channel`]: Channels, handshake, relay routing and the hub listener
//! - [`message`]: Named process messages with role addressing

/// Re-export value types.
pub mod value {
    pub use procmux_value::*;
}

/// Re-export transport types.
pub mod transport {
    pub use procmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use procmux_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use procmux_channel::*;
}

/// Re-export process message types.
pub mod message {
    pub use procmux_message::*;
}
