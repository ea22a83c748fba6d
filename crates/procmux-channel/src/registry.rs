use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::channel::Channel;
use crate::error::{ChannelError, Result};

/// Channels known to this process, keyed by channel id.
///
/// Consulted when routing `Relay` frames. Channels add themselves when their
/// handshake completes and remove themselves when they close. Shared as
/// `Arc<ChannelRegistry>` between every channel that should be able to reach
/// the others.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<i64, Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` under its id.
    ///
    /// Fails with [`ChannelError::DuplicateChannel`] when another channel
    /// that is still open holds the id. A closed leftover is replaced.
    pub fn register(&self, channel: &Channel) -> Result<()> {
        let id = channel
            .id()
            .ok_or_else(|| ChannelError::Protocol("cannot register a channel without an id".into()))?;

        // Inspect the current holder without the map lock held.
        let seen = self.lookup(id);
        if let Some(existing) = &seen {
            if existing.ptr_eq(channel) {
                return Ok(());
            }
            if !existing.is_closed() {
                return Err(ChannelError::DuplicateChannel(id));
            }
        }

        let mut channels = self.lock();
        let taken = match (channels.get(&id), &seen) {
            (Some(current), _) if current.ptr_eq(channel) => return Ok(()),
            (Some(current), Some(seen)) => !current.ptr_eq(seen),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if taken {
            // Another channel took the id between the check and the insert.
            return Err(ChannelError::DuplicateChannel(id));
        }
        channels.insert(id, channel.clone());
        debug!(channel_id = id, role = channel.role().as_str(), "channel registered");
        Ok(())
    }

    /// Remove `channel` from `id`, if it is the channel registered there.
    ///
    /// A different channel that has since taken over the id is left alone.
    pub fn unregister(&self, id: i64, channel: &Channel) -> bool {
        let mut channels = self.lock();
        match channels.get(&id) {
            Some(existing) if existing.ptr_eq(channel) => {
                channels.remove(&id);
                debug!(channel_id = id, "channel unregistered");
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, id: i64) -> Option<Channel> {
        self.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Close every registered channel.
    pub fn close_all(&self) {
        let channels: Vec<Channel> = self.lock().values().cloned().collect();
        // Closing unregisters, which takes the lock again.
        for channel in channels {
            channel.close();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
