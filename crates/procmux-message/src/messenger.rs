use bytes::Bytes;
use procmux_channel::Channel;
use tracing::debug;

use crate::envelope::encode_envelope;
use crate::error::{MessageError, Result};
use crate::message::ProcessMessage;
use crate::role::ProcessRole;

/// Sends process messages over a channel on behalf of a process role.
#[derive(Debug, Clone)]
pub struct ProcessMessenger {
    channel: Channel,
    local_role: ProcessRole,
}

impl ProcessMessenger {
    pub fn new(channel: Channel, local_role: ProcessRole) -> Self {
        Self {
            channel,
            local_role,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn local_role(&self) -> ProcessRole {
        self.local_role
    }

    /// Send `message` to the process on the other end of the channel.
    ///
    /// Returns `Ok(false)` when the channel is not connected.
    pub fn send_process_message(&self, target: ProcessRole, message: &ProcessMessage) -> Result<bool> {
        let payload = self.envelope(target, message)?;
        let sent = self.channel.send(&payload)?;
        debug!(
            channel_id = ?self.channel.id(),
            name = message.name(),
            target = target.as_str(),
            sent,
            "process message"
        );
        Ok(sent)
    }

    /// Send `message` to channel `channel_id` through the hub.
    ///
    /// Returns `Ok(false)` when the channel is not connected.
    pub fn send_process_message_to(
        &self,
        channel_id: i64,
        target: ProcessRole,
        message: &ProcessMessage,
    ) -> Result<bool> {
        let payload = self.envelope(target, message)?;
        let sent = self.channel.send_to_channel(channel_id, &payload)?;
        debug!(
            channel_id = ?self.channel.id(),
            to = channel_id,
            name = message.name(),
            target = target.as_str(),
            sent,
            "process message relayed"
        );
        Ok(sent)
    }

    fn envelope(&self, target: ProcessRole, message: &ProcessMessage) -> Result<Bytes> {
        if target == self.local_role {
            return Err(MessageError::SameRole(target));
        }
        encode_envelope(self.local_role, target, message)
    }
}
