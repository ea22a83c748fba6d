use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use procmux_transport::{Endpoint, IpcListener};
use tracing::{debug, info};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::Result;
use crate::handler::Handler;
use crate::registry::ChannelRegistry;

/// Hub side: accepts connections and turns each into a server-role channel.
///
/// Every accepted channel shares the listener's registry, which is what
/// lets `Relay` frames cross from one connection to another.
pub struct ChannelListener {
    listener: IpcListener,
    registry: Arc<ChannelRegistry>,
    config: ChannelConfig,
    handler: Option<Arc<dyn Handler>>,
    accepted: AtomicU64,
}

impl ChannelListener {
    /// Bind `endpoint`; accepted channels register in `registry`.
    pub fn bind(endpoint: &Endpoint, registry: Arc<ChannelRegistry>) -> Result<Self> {
        let listener = IpcListener::bind(endpoint)?;
        info!(endpoint = %listener.local_endpoint(), "hub listening");
        Ok(Self {
            listener,
            registry,
            config: ChannelConfig::default(),
            handler: None,
            accepted: AtomicU64::new(0),
        })
    }

    /// Override the configuration used for accepted channels.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Install `handler` on every accepted channel, for frames addressed to the hub itself.
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Accept the next connection.
    ///
    /// The returned channel is not connected yet; it adopts the peer's id
    /// when the peer's `Connect` arrives on its receive thread.
    pub fn accept(&self) -> Result<Channel> {
        let stream = self.listener.accept()?;
        let seq = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(seq, transport = stream.kind().as_str(), "accepted connection");
        Channel::server(stream, &self.registry, self.config.clone(), self.handler.clone())
    }

    /// The bound endpoint, with the actual port for `tcp:...:0` binds.
    pub fn local_endpoint(&self) -> Endpoint {
        self.listener.local_endpoint()
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ChannelListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListener")
            .field("listener", &self.listener)
            .field("accepted", &self.accepted())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc::Receiver;
    use std::thread;
    use std::time::Duration;

    use procmux_frame::FrameType;

    use super::*;
    use crate::handler::{QueueHandler, ReceivedFrame};

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/pmx-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("hub.sock")
    }

    /// Bind a hub and accept connections in the background until dropped by the test.
    fn spawn_hub(endpoint: &Endpoint) -> (Endpoint, Arc<ChannelRegistry>) {
        let registry = Arc::new(ChannelRegistry::new());
        let listener = ChannelListener::bind(endpoint, Arc::clone(&registry)).expect("hub should bind");
        let bound = listener.local_endpoint();
        thread::spawn(move || {
            while listener.accept().is_ok() {}
        });
        (bound, registry)
    }

    fn client(endpoint: &Endpoint, id: i64) -> (Channel, Receiver<ReceivedFrame>) {
        let (handler, rx) = QueueHandler::new();
        let registry = Arc::new(ChannelRegistry::new());
        let channel = Channel::connect(
            endpoint,
            id,
            &registry,
            ChannelConfig::default(),
            Some(Arc::new(handler)),
        )
        .expect("client should connect");
        (channel, rx)
    }

    fn cleanup(path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn relay_through_unix_hub_reaches_only_the_target() {
        let sock_path = make_sock_path("relay");
        let (endpoint, hub_registry) = spawn_hub(&Endpoint::unix(&sock_path));

        let (a, a_rx) = client(&endpoint, 1);
        let (_b, b_rx) = client(&endpoint, 2);
        let (_c, c_rx) = client(&endpoint, 3);

        assert!(a.send_to_channel(2, b"hello").unwrap());

        let received = b_rx.recv_timeout(WAIT).expect("B should receive the relay");
        assert_eq!(received.frame_type, FrameType::Relay);
        assert_eq!(received.from, 1);
        assert_eq!(received.to, 2);
        assert_eq!(received.payload.as_ref(), b"hello");
        assert!(c_rx.recv_timeout(QUIET).is_err());
        assert!(a_rx.recv_timeout(QUIET).is_err());
        assert_eq!(hub_registry.ids(), vec![1, 2, 3]);

        cleanup(&sock_path);
    }

    #[test]
    fn relay_through_tcp_hub() {
        let (endpoint, _registry) = spawn_hub(&"tcp:127.0.0.1:0".parse().unwrap());
        assert_eq!(endpoint.kind(), procmux_transport::TransportKind::Tcp);

        let (a, _a_rx) = client(&endpoint, 1);
        let (b, b_rx) = client(&endpoint, 2);
        assert_eq!(b.transport(), procmux_transport::TransportKind::Tcp);

        assert!(a.send_to_channel(2, b"over tcp").unwrap());
        let received = b_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(received.from, 1);
        assert_eq!(received.payload.as_ref(), b"over tcp");
    }

    #[test]
    fn closing_one_client_leaves_the_others_working() {
        let sock_path = make_sock_path("contain");
        let (endpoint, hub_registry) = spawn_hub(&Endpoint::unix(&sock_path));

        let (a, _a_rx) = client(&endpoint, 1);
        let (b, _b_rx) = client(&endpoint, 2);
        let (_c, c_rx) = client(&endpoint, 3);

        a.close();
        let deadline = std::time::Instant::now() + WAIT;
        while hub_registry.contains(1) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!hub_registry.contains(1));

        assert!(b.is_connected());
        assert!(b.send_to_channel(3, b"still here").unwrap());
        assert_eq!(c_rx.recv_timeout(WAIT).unwrap().payload.as_ref(), b"still here");

        // Relays to the departed client are dropped quietly.
        assert!(b.send_to_channel(1, b"gone").unwrap());
        assert!(b.is_connected());

        cleanup(&sock_path);
    }

    #[test]
    fn hub_handler_sees_common_frames_and_replies() {
        let sock_path = make_sock_path("direct");
        let registry = Arc::new(ChannelRegistry::new());
        let echo = |ctx: &crate::handler::MessageContext| {
            ctx.reply(ctx.payload())
                .map(|_| ())
                .map_err(|err| crate::handler::HandlerError::new(err.to_string()))
        };
        let listener = ChannelListener::bind(&Endpoint::unix(&sock_path), Arc::clone(&registry))
            .unwrap()
            .with_handler(Arc::new(echo));
        thread::spawn(move || {
            while listener.accept().is_ok() {}
        });

        let (a, a_rx) = client(&Endpoint::unix(&sock_path), 1);
        assert!(a.send(b"echo me").unwrap());
        let received = a_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(received.frame_type, FrameType::Common);
        assert_eq!(received.payload.as_ref(), b"echo me");

        cleanup(&sock_path);
    }

    #[test]
    fn duplicate_id_cannot_connect() {
        let sock_path = make_sock_path("dup");
        let (endpoint, _registry) = spawn_hub(&Endpoint::unix(&sock_path));

        let (_first, _rx) = client(&endpoint, 9);
        let registry = Arc::new(ChannelRegistry::new());
        let second = Channel::connect(&endpoint, 9, &registry, ChannelConfig::default(), None);
        assert!(second.is_err());

        cleanup(&sock_path);
    }
}
