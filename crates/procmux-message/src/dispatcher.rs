use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use procmux_channel::{Channel, Handler, HandlerError, MessageContext};
use procmux_frame::FrameType;
use procmux_value::ArrayValue;
use tracing::{debug, error};

use crate::envelope::decode_envelope;
use crate::error::Result;
use crate::message::ProcessMessage;
use crate::messenger::ProcessMessenger;
use crate::role::{ListenerScope, ProcessRole};

/// A process message as seen by a listener.
#[derive(Debug)]
pub struct IncomingMessage {
    message: ProcessMessage,
    source: ProcessRole,
    from: i64,
    relayed: bool,
    messenger: ProcessMessenger,
}

impl IncomingMessage {
    pub fn name(&self) -> &str {
        self.message.name()
    }

    pub fn argument_list(&self) -> &ArrayValue {
        self.message.argument_list()
    }

    pub fn message(&self) -> &ProcessMessage {
        &self.message
    }

    /// Role of the process that sent the message.
    pub fn source(&self) -> ProcessRole {
        self.source
    }

    /// Channel id the message originated from.
    pub fn from(&self) -> i64 {
        self.from
    }

    /// Whether the message was relayed through the hub from another channel.
    pub fn is_relayed(&self) -> bool {
        self.relayed
    }

    /// The channel the message arrived on.
    pub fn channel(&self) -> &Channel {
        self.messenger.channel()
    }

    /// Send `message` back to the sender, relaying when the original was relayed.
    pub fn reply(&self, message: &ProcessMessage) -> Result<bool> {
        if self.relayed {
            self.messenger
                .send_process_message_to(self.from, self.source, message)
        } else {
            self.messenger.send_process_message(self.source, message)
        }
    }
}

/// Callback for a named process message.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, incoming: &IncomingMessage) -> std::result::Result<(), HandlerError>;
}

impl<F> MessageListener for F
where
    F: Fn(&IncomingMessage) -> std::result::Result<(), HandlerError> + Send + Sync,
{
    fn on_message(&self, incoming: &IncomingMessage) -> std::result::Result<(), HandlerError> {
        self(incoming)
    }
}

struct Registration {
    scope: ListenerScope,
    listener: Arc<dyn MessageListener>,
}

/// Channel handler that routes process messages to listeners by name.
///
/// Install it on a channel with `channel.set_shared_handler(dispatcher)`
/// (or pass it when dialing); one dispatcher can serve many channels.
pub struct MessageDispatcher {
    local_role: ProcessRole,
    listeners: RwLock<HashMap<String, Vec<Registration>>>,
}

impl MessageDispatcher {
    pub fn new(local_role: ProcessRole) -> Self {
        Self {
            local_role,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_role(&self) -> ProcessRole {
        self.local_role
    }

    /// Register `listener` for messages named `name`.
    ///
    /// The listener only fires in processes whose role `scope` admits.
    pub fn on<L: MessageListener + 'static>(&self, name: impl Into<String>, scope: ListenerScope, listener: L) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.into())
            .or_default()
            .push(Registration {
                scope,
                listener: Arc::new(listener),
            });
    }

    /// Remove every listener for `name`. Returns how many were removed.
    pub fn off(&self, name: &str) -> usize {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map_or(0, |registrations| registrations.len())
    }

    /// Listeners for `name` that would fire in this process.
    pub fn listener_count(&self, name: &str) -> usize {
        self.active_listeners(name).len()
    }

    fn active_listeners(&self, name: &str) -> Vec<Arc<dyn MessageListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|registrations| {
                registrations
                    .iter()
                    .filter(|registration| registration.scope.admits(self.local_role))
                    .map(|registration| Arc::clone(&registration.listener))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Handler for MessageDispatcher {
    fn handle(&self, ctx: &MessageContext) -> std::result::Result<(), HandlerError> {
        let envelope = decode_envelope(ctx.payload())
            .map_err(|err| HandlerError::new(format!("undecodable process message: {err}")))?;

        if envelope.target != self.local_role {
            debug!(
                name = envelope.message.name(),
                target = envelope.target.as_str(),
                local = self.local_role.as_str(),
                "process message for another role; dropping"
            );
            return Ok(());
        }

        let listeners = self.active_listeners(envelope.message.name());
        if listeners.is_empty() {
            debug!(name = envelope.message.name(), from = ctx.from(), "no listener for process message");
            return Ok(());
        }

        let incoming = IncomingMessage {
            message: envelope.message,
            source: envelope.source,
            from: ctx.from(),
            relayed: ctx.frame_type() == FrameType::Relay,
            messenger: ProcessMessenger::new(ctx.channel().clone(), self.local_role),
        };

        // Each listener runs on its own; one panicking does not skip the rest.
        let failures: Vec<String> = listeners
            .iter()
            .filter_map(|listener| {
                match panic::catch_unwind(AssertUnwindSafe(|| listener.on_message(&incoming))) {
                    Ok(result) => result.err().map(|err| err.to_string()),
                    Err(panic) => {
                        let message = panic_message(&*panic);
                        error!(name = incoming.name(), from = incoming.from(), panic = message, "listener panicked");
                        Some(format!("listener panicked: {message}"))
                    }
                }
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::new(format!(
                "listener for '{}' failed: {}",
                incoming.name(),
                failures.join("; ")
            )))
        }
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("MessageDispatcher")
            .field("local_role", &self.local_role)
            .field("names", &names)
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
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use procmux_channel::{ChannelConfig, ChannelListener, ChannelRegistry};
    use procmux_transport::{Endpoint, IpcStream};
    use procmux_value::ObjectValue;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    type Seen = (String, ProcessRole, i64, bool, ArrayValue);

    fn recorder(tx: mpsc::Sender<Seen>) -> impl MessageListener {
        move |incoming: &IncomingMessage| {
            tx.send((
                incoming.name().to_string(),
                incoming.source(),
                incoming.from(),
                incoming.is_relayed(),
                incoming.argument_list().clone(),
            ))
            .map_err(|_| HandlerError::new("test receiver gone"))
        }
    }

    /// A sub process (client, id 7) talking directly to the main process (server).
    fn main_and_sub(
        main: Arc<MessageDispatcher>,
        sub: Arc<MessageDispatcher>,
    ) -> (ProcessMessenger, ProcessMessenger) {
        let (main_stream, sub_stream) = IpcStream::pair().unwrap();
        let main_channel = Channel::server(
            main_stream,
            &Arc::new(ChannelRegistry::new()),
            ChannelConfig::default(),
            Some(main),
        )
        .unwrap();
        let sub_channel = Channel::client(
            sub_stream,
            7,
            &Arc::new(ChannelRegistry::new()),
            ChannelConfig::default(),
            Some(sub),
        )
        .unwrap();
        sub_channel.wait_connected(WAIT).unwrap();
        main_channel.wait_connected(WAIT).unwrap();
        (
            ProcessMessenger::new(main_channel, ProcessRole::Main),
            ProcessMessenger::new(sub_channel, ProcessRole::Sub),
        )
    }

    #[test]
    fn sub_to_main_reaches_main_scoped_listener() {
        let main = Arc::new(MessageDispatcher::new(ProcessRole::Main));
        let sub = Arc::new(MessageDispatcher::new(ProcessRole::Sub));
        let (tx, rx) = mpsc::channel();
        main.on("testName", ListenerScope::Main, recorder(tx));

        let (_main, sub_messenger) = main_and_sub(Arc::clone(&main), sub);

        let mut message = ProcessMessage::new("testName");
        message.argument_list_mut().set_string(0, "to the main process");
        let mut object = ObjectValue::new();
        object.set_double("doubledicttest", 9999.666);
        message.argument_list_mut().set_object(1, object);
        assert!(sub_messenger
            .send_process_message(ProcessRole::Main, &message)
            .unwrap());

        let (name, source, from, relayed, args) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(name, "testName");
        assert_eq!(source, ProcessRole::Sub);
        assert_eq!(from, 7);
        assert!(!relayed);
        assert_eq!(&args, message.argument_list());
    }

    #[test]
    fn panicking_listener_does_not_skip_the_others() {
        let main = Arc::new(MessageDispatcher::new(ProcessRole::Main));
        let sub = Arc::new(MessageDispatcher::new(ProcessRole::Sub));
        let (tx, rx) = mpsc::channel();
        main.on("boot", ListenerScope::Main, |_incoming: &IncomingMessage| -> std::result::Result<(), HandlerError> {
            panic!("listener blew up")
        });
        main.on("boot", ListenerScope::Main, recorder(tx));

        let (main_messenger, sub_messenger) = main_and_sub(Arc::clone(&main), sub);
        for _ in 0..2 {
            assert!(sub_messenger
                .send_process_message(ProcessRole::Main, &ProcessMessage::new("boot"))
                .unwrap());
        }

        for _ in 0..2 {
            let (name, source, _, _, _) = rx.recv_timeout(WAIT).unwrap();
            assert_eq!(name, "boot");
            assert_eq!(source, ProcessRole::Sub);
        }
        assert!(main_messenger.channel().is_connected());
    }

    #[test]
    fn scope_filters_listeners_by_local_role() {
        let main = Arc::new(MessageDispatcher::new(ProcessRole::Main));
        let sub = Arc::new(MessageDispatcher::new(ProcessRole::Sub));
        let (main_only_tx, main_only_rx) = mpsc::channel();
        let (sub_only_tx, sub_only_rx) = mpsc::channel();
        let (all_tx, all_rx) = mpsc::channel();
        main.on("event", ListenerScope::Main, recorder(main_only_tx));
        main.on("event", ListenerScope::Sub, recorder(sub_only_tx));
        main.on("event", ListenerScope::All, recorder(all_tx));
        assert_eq!(main.listener_count("event"), 2);

        let (_main, sub_messenger) = main_and_sub(Arc::clone(&main), sub);
        sub_messenger
            .send_process_message(ProcessRole::Main, &ProcessMessage::new("event"))
            .unwrap();

        assert!(main_only_rx.recv_timeout(WAIT).is_ok());
        assert!(all_rx.recv_timeout(WAIT).is_ok());
        assert!(sub_only_rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn reply_goes_back_to_the_sender() {
        let main = Arc::new(MessageDispatcher::new(ProcessRole::Main));
        let sub = Arc::new(MessageDispatcher::new(ProcessRole::Sub));
        main.on("ping", ListenerScope::Main, |incoming: &IncomingMessage| {
            let mut pong = ProcessMessage::new("pong");
            pong.argument_list_mut()
                .set_int(0, incoming.argument_list().get_int(0) + 1);
            incoming
                .reply(&pong)
                .map(|_| ())
                .map_err(|err| HandlerError::new(err.to_string()))
        });
        let (tx, rx) = mpsc::channel();
        sub.on("pong", ListenerScope::Sub, recorder(tx));

        let (_main, sub_messenger) = main_and_sub(main, Arc::clone(&sub));
        let mut ping = ProcessMessage::new("ping");
        ping.argument_list_mut().set_int(0, 41);
        sub_messenger
            .send_process_message(ProcessRole::Main, &ping)
            .unwrap();

        let (name, source, _, _, args) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(name, "pong");
        assert_eq!(source, ProcessRole::Main);
        assert_eq!(args.get_int(0), 42);
    }

    #[test]
    fn messages_for_another_role_are_dropped() {
        let main = Arc::new(MessageDispatcher::new(ProcessRole::Main));
        let sub = Arc::new(MessageDispatcher::new(ProcessRole::Sub));
        let (tx, rx) = mpsc::channel();
        sub.on("event", ListenerScope::All, recorder(tx));

        let (main_messenger, _sub) = main_and_sub(main, Arc::clone(&sub));
        // Addressed to Main but delivered to the sub process.
        let misdirected = ProcessMessenger::new(main_messenger.channel().clone(), ProcessRole::Sub);
        misdirected
            .send_process_message(ProcessRole::Main, &ProcessMessage::new("event"))
            .unwrap();
        assert!(rx.recv_timeout(QUIET).is_err());

        main_messenger
            .send_process_message(ProcessRole::Sub, &ProcessMessage::new("event"))
            .unwrap();
        assert!(rx.recv_timeout(WAIT).is_ok());
    }

    #[test]
    fn off_removes_listeners() {
        let dispatcher = MessageDispatcher::new(ProcessRole::Sub);
        dispatcher.on("a", ListenerScope::Sub, |_: &IncomingMessage| Ok(()));
        dispatcher.on("a", ListenerScope::All, |_: &IncomingMessage| Ok(()));
        assert_eq!(dispatcher.listener_count("a"), 2);
        assert_eq!(dispatcher.off("a"), 2);
        assert_eq!(dispatcher.listener_count("a"), 0);
        assert_eq!(dispatcher.off("a"), 0);
    }

    #[test]
    fn relayed_message_reaches_listener_on_another_channel() {
        let dir = PathBuf::from(format!(
            "/tmp/pmx-msg-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let endpoint = Endpoint::unix(dir.join("hub.sock"));

        let listener = ChannelListener::bind(&endpoint, Arc::new(ChannelRegistry::new())).unwrap();
        thread::spawn(move || {
            while listener.accept().is_ok() {}
        });

        let sender_registry = Arc::new(ChannelRegistry::new());
        let sender = Channel::connect(&endpoint, 1, &sender_registry, ChannelConfig::default(), None).unwrap();

        let receiver_dispatcher = Arc::new(MessageDispatcher::new(ProcessRole::Sub));
        let (tx, rx) = mpsc::channel();
        receiver_dispatcher.on("hello", ListenerScope::Sub, recorder(tx));
        let receiver_registry = Arc::new(ChannelRegistry::new());
        let _receiver = Channel::connect(
            &endpoint,
            2,
            &receiver_registry,
            ChannelConfig::default(),
            Some(receiver_dispatcher),
        )
        .unwrap();

        // Channel 1 belongs to the coordinator; channel 2 to a sub process.
        let messenger = ProcessMessenger::new(sender, ProcessRole::Main);
        assert!(messenger
            .send_process_message_to(2, ProcessRole::Sub, &ProcessMessage::new("hello"))
            .unwrap());

        let (name, source, from, relayed, _) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(name, "hello");
        assert_eq!(source, ProcessRole::Main);
        assert_eq!(from, 1);
        assert!(relayed);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
