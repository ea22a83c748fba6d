use std::time::Duration;

use procmux_frame::FrameConfig;

/// Configuration for a channel connection.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Frame limits and socket timeouts for the connection.
    ///
    /// A read timeout here applies to the receive loop, so an idle channel
    /// disconnects once it elapses. Leave it unset for long-lived channels.
    pub frame: FrameConfig,
    /// How long [`Channel::connect`](crate::Channel::connect) waits for `ConnectAck`.
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
