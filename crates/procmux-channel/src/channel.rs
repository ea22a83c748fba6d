use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use procmux_frame::{Frame, FrameError, FrameReader, FrameType, FrameWriter};
use procmux_transport::{Endpoint, IpcStream, TransportKind};
use tracing::{debug, error, info, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::handler::{Handler, HandlerError, MessageContext};
use crate::registry::ChannelRegistry;

/// Which end of a connection a channel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Dialed out and announced its own id.
    Client,
    /// Accepted by a hub; stands in for the remote client whose id it adopts.
    Server,
}

impl ChannelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelRole::Client => "client",
            ChannelRole::Server => "server",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a multiplexed connection.
///
/// `Channel` is a cheap, cloneable handle; all clones refer to the same
/// connection. Sending is safe from any thread. The connection stays open
/// until [`Channel::close`] is called or the receive loop hits EOF, an I/O
/// error or a protocol violation; a closed channel never reopens.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

struct Inner {
    id: OnceLock<i64>,
    role: ChannelRole,
    transport: TransportKind,
    registry: Arc<ChannelRegistry>,
    writer: Mutex<Option<FrameWriter<IpcStream>>>,
    // Kept apart from the writer so close() never waits behind a blocked write.
    control: IpcStream,
    handler: RwLock<Option<Arc<dyn Handler>>>,
    state: Mutex<State>,
    state_changed: Condvar,
}

#[derive(Default)]
struct State {
    connected: bool,
    closed: bool,
}

impl Channel {
    /// Dial `endpoint` and announce `id`.
    ///
    /// Returns as soon as `Connect` is written; the channel is connected once
    /// the hub acknowledges. Use [`Channel::connect`] to wait for that.
    pub fn dial(
        endpoint: &Endpoint,
        id: i64,
        registry: &Arc<ChannelRegistry>,
        config: ChannelConfig,
    ) -> Result<Self> {
        Self::dial_with_handler(endpoint, id, registry, config, None)
    }

    /// Like [`Channel::dial`], with the handler installed before any frame is read.
    pub fn dial_with_handler(
        endpoint: &Endpoint,
        id: i64,
        registry: &Arc<ChannelRegistry>,
        config: ChannelConfig,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<Self> {
        let stream = procmux_transport::connect(endpoint)?;
        debug!(channel_id = id, %endpoint, "dialed hub");
        Self::client(stream, id, registry, config, handler)
    }

    /// Dial and block until the handshake completes or `config.connect_timeout` elapses.
    pub fn connect(
        endpoint: &Endpoint,
        id: i64,
        registry: &Arc<ChannelRegistry>,
        config: ChannelConfig,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<Self> {
        let timeout = config.connect_timeout;
        let channel = Self::dial_with_handler(endpoint, id, registry, config, handler)?;
        if let Err(err) = channel.wait_connected(timeout) {
            channel.close();
            return Err(err);
        }
        Ok(channel)
    }

    /// Run the client side of the protocol over an established stream.
    pub fn client(
        stream: IpcStream,
        id: i64,
        registry: &Arc<ChannelRegistry>,
        config: ChannelConfig,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<Self> {
        let (channel, reader) =
            Self::from_stream(stream, ChannelRole::Client, Some(id), registry, config, handler)?;
        channel.spawn_receiver(reader)?;
        if let Err(err) = channel.write_raw(&Frame::connect(id)) {
            channel.close();
            return Err(err);
        }
        Ok(channel)
    }

    /// Run the hub side of the protocol over an accepted stream.
    ///
    /// The channel has no id until the peer's `Connect` arrives.
    pub fn server(
        stream: IpcStream,
        registry: &Arc<ChannelRegistry>,
        config: ChannelConfig,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<Self> {
        let (channel, reader) =
            Self::from_stream(stream, ChannelRole::Server, None, registry, config, handler)?;
        channel.spawn_receiver(reader)?;
        Ok(channel)
    }

    fn from_stream(
        stream: IpcStream,
        role: ChannelRole,
        id: Option<i64>,
        registry: &Arc<ChannelRegistry>,
        config: ChannelConfig,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<(Self, FrameReader<IpcStream>)> {
        let transport = stream.kind();
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;

        let reader = FrameReader::with_config_ipc(reader_stream, config.frame.clone())?;
        let writer = FrameWriter::with_config_ipc(stream, config.frame)?;

        let id_cell = OnceLock::new();
        if let Some(id) = id {
            let _ = id_cell.set(id);
        }

        let channel = Self {
            inner: Arc::new(Inner {
                id: id_cell,
                role,
                transport,
                registry: Arc::clone(registry),
                writer: Mutex::new(Some(writer)),
                control,
                handler: RwLock::new(handler),
                state: Mutex::new(State::default()),
                state_changed: Condvar::new(),
            }),
        };
        Ok((channel, reader))
    }

    /// The channel id: fixed for clients, adopted from `Connect` for servers.
    pub fn id(&self) -> Option<i64> {
        self.inner.id.get().copied()
    }

    pub fn role(&self) -> ChannelRole {
        self.inner.role
    }

    pub fn transport(&self) -> TransportKind {
        self.inner.transport
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.inner.registry
    }

    /// Whether the handshake has completed and the channel is still open.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Block until the handshake completes.
    ///
    /// Fails with [`ChannelError::Closed`] if the channel closes first and
    /// [`ChannelError::Timeout`] if `timeout` elapses.
    pub fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if state.connected {
                return Ok(());
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ChannelError::Timeout(timeout));
            }
            state = match self.inner.state_changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Install the handler for frames decoded from now on.
    pub fn set_handler<H: Handler + 'static>(&self, handler: H) {
        self.set_shared_handler(Arc::new(handler));
    }

    /// Install a handler that is shared with other channels.
    pub fn set_shared_handler(&self, handler: Arc<dyn Handler>) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Remove the handler; later frames are dropped.
    pub fn clear_handler(&self) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Send `payload` to the peer as a `Common` frame.
    ///
    /// Returns `Ok(false)` without writing anything when the channel is not
    /// connected. A failed write closes the channel and is returned as an error.
    pub fn send(&self, payload: &[u8]) -> Result<bool> {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        self.write_when_connected(FrameType::Common, id, id, payload)
    }

    /// Send `payload` to channel `target` through the hub as a `Relay` frame.
    ///
    /// Same contract as [`Channel::send`].
    pub fn send_to_channel(&self, target: i64, payload: &[u8]) -> Result<bool> {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        self.write_when_connected(FrameType::Relay, id, target, payload)
    }

    /// Close the connection and leave the registry. Idempotent.
    ///
    /// Wakes the receive thread, which then exits.
    pub fn close(&self) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.connected = false;
        }
        self.inner.state_changed.notify_all();

        if let Err(err) = self.inner.control.shutdown() {
            debug!(channel_id = ?self.id(), error = %err, "socket shutdown failed");
        }
        drop(self.lock_writer().take());

        if let Some(id) = self.id() {
            self.inner.registry.unregister(id, self);
        }
        debug!(channel_id = ?self.id(), role = self.role().as_str(), "channel closed");
    }

    pub(crate) fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn spawn_receiver(&self, reader: FrameReader<IpcStream>) -> Result<()> {
        let name = match self.id() {
            Some(id) => format!("procmux-recv-{id}"),
            None => "procmux-recv-hub".to_string(),
        };
        let channel = self.clone();
        thread::Builder::new()
            .name(name)
            .spawn(move || channel.receive_loop(reader))?;
        Ok(())
    }

    fn receive_loop(self, mut reader: FrameReader<IpcStream>) {
        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => {
                    if !self.is_closed() {
                        debug!(channel_id = ?self.id(), "peer disconnected");
                    }
                    break;
                }
                Err(err) if err.is_protocol_violation() => {
                    warn!(channel_id = ?self.id(), error = %err, "invalid frame; closing channel");
                    break;
                }
                Err(err) => {
                    if !self.is_closed() {
                        warn!(channel_id = ?self.id(), error = %err, "read failed; closing channel");
                    }
                    break;
                }
            };

            trace!(
                channel_id = ?self.id(),
                frame_type = frame.frame_type.as_str(),
                from = frame.from,
                to = frame.to,
                len = frame.payload.len(),
                "frame received"
            );

            match self.dispatch(frame) {
                Ok(()) => {}
                Err(err) if !err.is_fatal() => {
                    warn!(channel_id = ?self.id(), error = %err, "handler failed");
                }
                Err(err) => {
                    warn!(channel_id = ?self.id(), error = %err, "closing channel");
                    break;
                }
            }
        }
        self.close();
    }

    fn dispatch(&self, frame: Frame) -> Result<()> {
        match frame.frame_type {
            FrameType::Connect => self.on_connect(&frame),
            FrameType::ConnectAck => self.on_connect_ack(&frame),
            FrameType::Common => {
                self.require_handshake(&frame)?;
                self.deliver(frame)
            }
            FrameType::Relay => {
                self.require_handshake(&frame)?;
                self.route_relay(frame)
            }
        }
    }

    fn require_handshake(&self, frame: &Frame) -> Result<()> {
        if self.role() == ChannelRole::Server && !self.is_connected() {
            return Err(ChannelError::Protocol(format!(
                "{} frame before Connect",
                frame.frame_type
            )));
        }
        Ok(())
    }

    fn on_connect(&self, frame: &Frame) -> Result<()> {
        if self.role() == ChannelRole::Client {
            warn!(channel_id = ?self.id(), from = frame.from, "client received Connect; ignoring");
            return Ok(());
        }

        let id = frame
            .announced_id()
            .ok_or_else(|| ChannelError::Protocol("malformed Connect payload".into()))?;

        if let Some(current) = self.id() {
            if current == id {
                debug!(channel_id = id, "repeated Connect; ignoring");
                return Ok(());
            }
            return Err(ChannelError::Protocol(format!(
                "Connect for {id} on a channel already bound to {current}"
            )));
        }

        let _ = self.inner.id.set(id);
        self.join_registry(id)?;
        self.write_raw(&Frame::connect_ack(id))?;
        self.mark_connected(id);
        Ok(())
    }

    fn on_connect_ack(&self, frame: &Frame) -> Result<()> {
        if self.role() == ChannelRole::Server {
            warn!(channel_id = ?self.id(), from = frame.from, "server received ConnectAck; ignoring");
            return Ok(());
        }

        let id = frame
            .announced_id()
            .ok_or_else(|| ChannelError::Protocol("malformed ConnectAck payload".into()))?;
        if self.id() != Some(id) {
            return Err(ChannelError::Protocol(format!(
                "ConnectAck for {id}, expected {:?}",
                self.id()
            )));
        }
        if self.is_connected() {
            debug!(channel_id = id, "repeated ConnectAck; ignoring");
            return Ok(());
        }

        self.join_registry(id)?;
        self.mark_connected(id);
        Ok(())
    }

    /// Register under `id`, backing out if `close` ran concurrently.
    ///
    /// `close` only unregisters an entry that already exists, so a channel
    /// closed before this point would otherwise stay registered.
    fn join_registry(&self, id: i64) -> Result<()> {
        self.inner.registry.register(self)?;
        if self.is_closed() {
            self.inner.registry.unregister(id, self);
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    fn mark_connected(&self, id: i64) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.connected = true;
        }
        self.inner.state_changed.notify_all();
        info!(channel_id = id, role = self.role().as_str(), transport = self.transport().as_str(), "channel connected");

        if let Some(handler) = self.handler() {
            let notified = panic::catch_unwind(AssertUnwindSafe(|| handler.on_connected(self, id)));
            if let Err(panic) = notified {
                error!(channel_id = id, panic = panic_message(&*panic), "handler panicked in on_connected");
            }
        }
    }

    fn route_relay(&self, frame: Frame) -> Result<()> {
        let own_id = self.id();
        match self.role() {
            ChannelRole::Server if own_id != Some(frame.from) => {
                warn!(
                    channel_id = ?own_id,
                    from = frame.from,
                    to = frame.to,
                    "relay frame does not originate from this peer; dropping"
                );
                return Ok(());
            }
            ChannelRole::Client if own_id == Some(frame.to) => return self.deliver(frame),
            _ => {}
        }

        let Some(target) = self.inner.registry.lookup(frame.to) else {
            warn!(channel_id = ?own_id, from = frame.from, to = frame.to, "relay target not registered; dropping");
            return Ok(());
        };

        match target.role() {
            ChannelRole::Client => target.deliver(frame),
            ChannelRole::Server => {
                target.forward(frame);
                Ok(())
            }
        }
    }

    /// Write a relayed frame onward to this channel's peer, keeping its origin.
    fn forward(&self, frame: Frame) {
        match self.write_when_connected(FrameType::Relay, frame.from, frame.to, &frame.payload) {
            Ok(true) => trace!(from = frame.from, to = frame.to, "frame relayed"),
            Ok(false) => warn!(from = frame.from, to = frame.to, "relay target not connected; dropping"),
            Err(err) => warn!(from = frame.from, to = frame.to, error = %err, "relay forward failed"),
        }
    }

    /// Hand a frame to this channel's handler.
    pub(crate) fn deliver(&self, frame: Frame) -> Result<()> {
        let Some(handler) = self.handler() else {
            debug!(
                channel_id = ?self.id(),
                frame_type = frame.frame_type.as_str(),
                from = frame.from,
                "no handler installed; dropping frame"
            );
            return Ok(());
        };

        let ctx = MessageContext::new(frame.frame_type, frame.from, frame.to, frame.payload, self.clone());
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx))) {
            Ok(result) => result.map_err(ChannelError::from),
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(channel_id = ?self.id(), from = ctx.from(), panic = message, "handler panicked");
                Err(HandlerError::new(format!("handler panicked: {message}")).into())
            }
        }
    }

    fn write_when_connected(&self, frame_type: FrameType, from: i64, to: i64, payload: &[u8]) -> Result<bool> {
        if !self.is_connected() {
            trace!(channel_id = ?self.id(), frame_type = frame_type.as_str(), "not connected; frame not sent");
            return Ok(false);
        }
        match self.write(frame_type, from, to, payload) {
            Ok(()) => Ok(true),
            Err(ChannelError::Closed) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn write_raw(&self, frame: &Frame) -> Result<()> {
        self.write(frame.frame_type, frame.from, frame.to, &frame.payload)
    }

    fn write(&self, frame_type: FrameType, from: i64, to: i64, payload: &[u8]) -> Result<()> {
        let result = {
            let mut writer = self.lock_writer();
            let Some(writer) = writer.as_mut() else {
                return Err(ChannelError::Closed);
            };
            writer.send(frame_type, from, to, payload)
        };

        match result {
            Ok(()) => Ok(()),
            // Rejected before anything hit the wire; the connection is fine.
            Err(err @ FrameError::PayloadTooLarge { .. }) => Err(err.into()),
            Err(err) => {
                warn!(channel_id = ?self.id(), error = %err, "write failed; closing channel");
                self.close();
                Err(err.into())
            }
        }
    }

    fn handler(&self) -> Option<Arc<dyn Handler>> {
        self.inner
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_writer(&self) -> MutexGuard<'_, Option<FrameWriter<IpcStream>>> {
        self.inner.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Channel")
            .field("id", &self.id())
            .field("role", &self.inner.role)
            .field("transport", &self.inner.transport)
            .field("connected", &state.connected)
            .field("closed", &state.closed)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::mpsc::Receiver;

    use super::*;
    use crate::handler::{QueueHandler, ReceivedFrame};

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    fn raw_peer(stream: IpcStream) -> (FrameReader<IpcStream>, FrameWriter<IpcStream>) {
        let config = procmux_frame::FrameConfig {
            read_timeout: Some(WAIT),
            write_timeout: Some(WAIT),
            ..Default::default()
        };
        let reader = FrameReader::with_config_ipc(stream.try_clone().unwrap(), config.clone()).unwrap();
        let writer = FrameWriter::with_config_ipc(stream, config).unwrap();
        (reader, writer)
    }

    fn queue() -> (Arc<dyn Handler>, Receiver<ReceivedFrame>) {
        let (handler, rx) = QueueHandler::new();
        (Arc::new(handler), rx)
    }

    /// A client channel whose hub end is driven by hand.
    fn handshaken_client(
        id: i64,
        handler: Option<Arc<dyn Handler>>,
    ) -> (Channel, FrameReader<IpcStream>, FrameWriter<IpcStream>) {
        let (ours, theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let client = Channel::client(ours, id, &registry, ChannelConfig::default(), handler).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);
        assert_eq!(reader.read_frame().unwrap(), Frame::connect(id));
        writer.write_frame(&Frame::connect_ack(id)).unwrap();
        client.wait_connected(WAIT).unwrap();
        (client, reader, writer)
    }

    /// A server channel whose client end is driven by hand.
    fn handshaken_server(
        id: i64,
        registry: &Arc<ChannelRegistry>,
        handler: Option<Arc<dyn Handler>>,
    ) -> (Channel, FrameReader<IpcStream>, FrameWriter<IpcStream>) {
        let (ours, theirs) = IpcStream::pair().unwrap();
        let server = Channel::server(ours, registry, ChannelConfig::default(), handler).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);
        writer.write_frame(&Frame::connect(id)).unwrap();
        assert_eq!(reader.read_frame().unwrap(), Frame::connect_ack(id));
        server.wait_connected(WAIT).unwrap();
        (server, reader, writer)
    }

    #[test]
    fn client_sends_nothing_until_acknowledged() {
        let (ours, theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let client = Channel::client(ours, 7, &registry, ChannelConfig::default(), None).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);

        assert_eq!(reader.read_frame().unwrap(), Frame::connect(7));
        assert!(!client.is_connected());
        assert!(!client.send(b"early").unwrap());
        assert!(!client.send_to_channel(9, b"early").unwrap());
        assert!(registry.is_empty());

        writer.write_frame(&Frame::connect_ack(7)).unwrap();
        client.wait_connected(WAIT).unwrap();
        assert!(registry.contains(7));

        assert!(client.send(b"late").unwrap());
        assert_eq!(reader.read_frame().unwrap(), Frame::common(7, &b"late"[..]));
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn client_rejects_mismatched_ack() {
        let (ours, theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let client = Channel::client(ours, 7, &registry, ChannelConfig::default(), None).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);
        reader.read_frame().unwrap();

        writer.write_frame(&Frame::connect_ack(8)).unwrap();
        assert!(matches!(client.wait_connected(WAIT), Err(ChannelError::Closed)));
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn wait_connected_times_out() {
        let (ours, _theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let client = Channel::client(ours, 1, &registry, ChannelConfig::default(), None).unwrap();
        assert!(matches!(
            client.wait_connected(Duration::from_millis(50)),
            Err(ChannelError::Timeout(_))
        ));
        client.close();
    }

    #[test]
    fn server_adopts_announced_id_and_registers() {
        let registry = Arc::new(ChannelRegistry::new());
        let (handler, rx) = queue();
        let (server, _reader, mut writer) = handshaken_server(42, &registry, Some(handler));

        assert_eq!(server.id(), Some(42));
        assert_eq!(server.role(), ChannelRole::Server);
        assert!(registry.lookup(42).unwrap().ptr_eq(&server));

        writer.write_frame(&Frame::common(42, &b"hi"[..])).unwrap();
        let received = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(received.frame_type, FrameType::Common);
        assert_eq!(received.from, 42);
        assert_eq!(received.channel_id, Some(42));
        assert_eq!(received.payload.as_ref(), b"hi");
    }

    #[test]
    fn server_rejects_traffic_before_connect() {
        let (ours, theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let (handler, rx) = queue();
        let server = Channel::server(ours, &registry, ChannelConfig::default(), Some(handler)).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);

        writer.write_frame(&Frame::common(1, &b"sneaky"[..])).unwrap();

        assert!(matches!(server.wait_connected(WAIT), Err(ChannelError::Closed)));
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
        assert!(rx.recv_timeout(QUIET).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn server_rejects_malformed_connect() {
        let (ours, theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let server = Channel::server(ours, &registry, ChannelConfig::default(), None).unwrap();
        let (_reader, mut writer) = raw_peer(theirs);

        writer
            .write_frame(&Frame::new(FrameType::Connect, 1, 1, &b"abc"[..]))
            .unwrap();
        assert!(matches!(server.wait_connected(WAIT), Err(ChannelError::Closed)));
        assert_eq!(server.id(), None);
    }

    #[test]
    fn server_rejects_rebinding_to_another_id() {
        let registry = Arc::new(ChannelRegistry::new());
        let (server, mut reader, mut writer) = handshaken_server(3, &registry, None);

        writer.write_frame(&Frame::connect(3)).unwrap();
        assert!(server.is_connected());

        writer.write_frame(&Frame::connect(4)).unwrap();
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
        assert!(server.is_closed());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_announced_id_is_refused() {
        let registry = Arc::new(ChannelRegistry::new());
        let (first, _r1, _w1) = handshaken_server(5, &registry, None);

        let (ours, theirs) = IpcStream::pair().unwrap();
        let second = Channel::server(ours, &registry, ChannelConfig::default(), None).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);
        writer.write_frame(&Frame::connect(5)).unwrap();

        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
        assert!(matches!(second.wait_connected(WAIT), Err(ChannelError::Closed)));
        assert!(registry.lookup(5).unwrap().ptr_eq(&first));
        assert!(first.is_connected());
    }

    #[test]
    fn frames_arrive_in_send_order() {
        let (handler, rx) = queue();
        let (client, mut reader, mut writer) = handshaken_client(1, Some(handler));

        for payload in [&b"P1"[..], b"P2", b"P3"] {
            assert!(client.send(payload).unwrap());
            writer.write_frame(&Frame::common(1, payload)).unwrap();
        }

        for expected in [&b"P1"[..], b"P2", b"P3"] {
            assert_eq!(reader.read_frame().unwrap().payload.as_ref(), expected);
            assert_eq!(rx.recv_timeout(WAIT).unwrap().payload.as_ref(), expected);
        }
    }

    #[test]
    fn concurrent_senders_never_interleave() {
        let (client, mut reader, _writer) = handshaken_client(1, None);
        let payload = vec![0x5A; 64 * 1024];

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let client = client.clone();
                let payload = payload.clone();
                thread::spawn(move || {
                    for _ in 0..8 {
                        assert!(client.send(&payload).unwrap());
                    }
                })
            })
            .collect();

        for _ in 0..32 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.frame_type, FrameType::Common);
            assert_eq!(frame.payload.as_ref(), payload.as_slice());
        }
        for handle in threads {
            handle.join().unwrap();
        }
    }

    #[test]
    fn handler_failures_do_not_stop_the_loop() {
        let (queue_handler, rx) = QueueHandler::new();
        let handler = move |ctx: &MessageContext| -> std::result::Result<(), HandlerError> {
            match ctx.payload().as_ref() {
                b"panic" => panic!("handler blew up"),
                b"fail" => Err("rejected".into()),
                _ => queue_handler.handle(ctx),
            }
        };
        let (client, _reader, mut writer) = handshaken_client(1, Some(Arc::new(handler)));

        for payload in [&b"panic"[..], b"fail", b"ok"] {
            writer.write_frame(&Frame::common(1, payload)).unwrap();
        }

        assert_eq!(rx.recv_timeout(WAIT).unwrap().payload.as_ref(), b"ok");
        assert!(client.is_connected());
    }

    #[test]
    fn replacing_the_handler_affects_later_frames() {
        let (first, first_rx) = queue();
        let (second, second_rx) = queue();
        let (client, _reader, mut writer) = handshaken_client(1, Some(first));

        writer.write_frame(&Frame::common(1, &b"a"[..])).unwrap();
        assert_eq!(first_rx.recv_timeout(WAIT).unwrap().payload.as_ref(), b"a");

        client.set_shared_handler(second);
        writer.write_frame(&Frame::common(1, &b"b"[..])).unwrap();
        assert_eq!(second_rx.recv_timeout(WAIT).unwrap().payload.as_ref(), b"b");
        assert!(first_rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn client_is_final_hop_for_relays_addressed_to_it() {
        let handler = |ctx: &MessageContext| -> std::result::Result<(), HandlerError> {
            assert_eq!(ctx.frame_type(), FrameType::Relay);
            ctx.reply(b"pong").map_err(|err| HandlerError::new(err.to_string()))?;
            Ok(())
        };
        let (_client, mut reader, mut writer) = handshaken_client(7, Some(Arc::new(handler)));

        writer.write_frame(&Frame::relay(5, 7, &b"ping"[..])).unwrap();
        assert_eq!(reader.read_frame().unwrap(), Frame::relay(7, 5, &b"pong"[..]));
    }

    #[test]
    fn hub_relays_between_peers_preserving_origin() {
        let registry = Arc::new(ChannelRegistry::new());
        let (_a, _a_reader, mut a_writer) = handshaken_server(1, &registry, None);
        let (_b, mut b_reader, _b_writer) = handshaken_server(2, &registry, None);

        // Spoofed origin and unknown target are dropped without closing anything.
        a_writer.write_frame(&Frame::relay(9, 2, &b"spoofed"[..])).unwrap();
        a_writer.write_frame(&Frame::relay(1, 99, &b"nobody"[..])).unwrap();
        a_writer.write_frame(&Frame::relay(1, 2, &b"hello"[..])).unwrap();

        assert_eq!(b_reader.read_frame().unwrap(), Frame::relay(1, 2, &b"hello"[..]));
        assert_eq!(registry.ids(), vec![1, 2]);
    }

    #[test]
    fn relay_to_local_client_uses_its_handler() {
        let registry = Arc::new(ChannelRegistry::new());
        let (handler, rx) = queue();

        let (local_stream, local_peer) = IpcStream::pair().unwrap();
        let local = Channel::client(local_stream, 10, &registry, ChannelConfig::default(), Some(handler)).unwrap();
        let (mut local_reader, mut local_writer) = raw_peer(local_peer);
        local_reader.read_frame().unwrap();
        local_writer.write_frame(&Frame::connect_ack(10)).unwrap();
        local.wait_connected(WAIT).unwrap();

        let (_remote, _reader, mut writer) = handshaken_server(11, &registry, None);
        writer.write_frame(&Frame::relay(11, 10, &b"inbound"[..])).unwrap();

        let received = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(received.from, 11);
        assert_eq!(received.channel_id, Some(10));
        assert_eq!(received.payload.as_ref(), b"inbound");
    }

    #[test]
    fn close_is_idempotent_and_silences_sends() {
        let (client, mut reader, _writer) = handshaken_client(4, None);
        let registry = Arc::clone(client.registry());
        assert!(registry.contains(4));

        client.close();
        client.close();

        assert!(client.is_closed());
        assert!(!client.is_connected());
        assert!(!registry.contains(4));
        assert!(!client.send(b"after").unwrap());
        assert!(matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn peer_disconnect_closes_and_unregisters() {
        let registry = Arc::new(ChannelRegistry::new());
        let (server, reader, writer) = handshaken_server(8, &registry, None);
        drop(reader);
        drop(writer);

        let deadline = Instant::now() + WAIT;
        while !server.is_closed() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(server.is_closed());
        assert!(!registry.contains(8));
    }

    #[test]
    fn oversized_send_is_rejected_without_closing() {
        let (ours, theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let config = ChannelConfig {
            frame: procmux_frame::FrameConfig {
                max_payload_size: 8,
                ..Default::default()
            },
            ..Default::default()
        };
        let client = Channel::client(ours, 1, &registry, config, None).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);
        reader.read_frame().unwrap();
        writer.write_frame(&Frame::connect_ack(1)).unwrap();
        client.wait_connected(WAIT).unwrap();

        assert!(matches!(
            client.send(&[0u8; 9]),
            Err(ChannelError::Frame(FrameError::PayloadTooLarge { .. }))
        ));
        assert!(client.is_connected());
        assert!(client.send(b"small").unwrap());
    }

    #[test]
    fn close_during_handshake_leaves_registry_empty() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let handler = move |_ctx: &MessageContext| -> std::result::Result<(), HandlerError> {
            let _ = entered_tx.send(());
            let _ = release_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv_timeout(WAIT);
            Ok(())
        };

        let (ours, theirs) = IpcStream::pair().unwrap();
        let registry = Arc::new(ChannelRegistry::new());
        let client =
            Channel::client(ours, 7, &registry, ChannelConfig::default(), Some(Arc::new(handler))).unwrap();
        let (mut reader, mut writer) = raw_peer(theirs);
        assert_eq!(reader.read_frame().unwrap(), Frame::connect(7));

        // Park the receive thread in the handler with the ack queued behind it.
        writer.write_frame(&Frame::common(7, &b"hold"[..])).unwrap();
        entered_rx.recv_timeout(WAIT).unwrap();
        writer.write_frame(&Frame::connect_ack(7)).unwrap();

        client.close();
        release_tx.send(()).unwrap();
        thread::sleep(QUIET);

        assert!(client.is_closed());
        assert!(!client.is_connected());
        assert!(!registry.contains(7));
        assert!(registry.is_empty());
    }

    #[test]
    fn on_connected_fires_once_per_handshake() {
        struct Notify(std::sync::mpsc::Sender<i64>);
        impl Handler for Notify {
            fn handle(&self, _ctx: &MessageContext) -> std::result::Result<(), HandlerError> {
                Ok(())
            }
            fn on_connected(&self, _channel: &Channel, id: i64) {
                let _ = self.0.send(id);
            }
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let registry = Arc::new(ChannelRegistry::new());
        let (_server, _reader, _writer) = handshaken_server(12, &registry, Some(Arc::new(Notify(tx))));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 12);
        assert!(rx.recv_timeout(QUIET).is_err());
    }
}
