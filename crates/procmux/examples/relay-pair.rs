//! Relay pair example: a hub plus a main and a sub channel in one process.
//!
//! The sub process relays `ready` to the main channel through the hub, and
//! the main side answers with `configure` on the same route.
//!
//! Run with:
//!   cargo run --example relay-pair

use std::fs;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use procmux::channel::{Channel, ChannelConfig, ChannelListener, ChannelRegistry, HandlerError};
use procmux::message::{IncomingMessage, ListenerScope, MessageDispatcher, ProcessMessage, ProcessMessenger, ProcessRole};
use procmux::transport::Endpoint;
use procmux::value::ArrayValue;

const MAIN_ID: i64 = 1;
const SUB_ID: i64 = 2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("procmux-relay-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let endpoint = Endpoint::unix(sock_dir.join("hub.sock"));

    let hub_registry = Arc::new(ChannelRegistry::new());
    let listener = ChannelListener::bind(&endpoint, Arc::clone(&hub_registry))?;
    thread::spawn(move || {
        for _ in 0..2 {
            if let Err(err) = listener.accept() {
                eprintln!("[hub] accept failed: {err}");
                return;
            }
        }
        // Keep the listener alive until the example exits.
        thread::park();
    });

    // Main side: answers `ready` with `configure`.
    let main_dispatcher = MessageDispatcher::new(ProcessRole::Main);
    main_dispatcher.on("ready", ListenerScope::Main, |incoming: &IncomingMessage| {
        eprintln!(
            "[main] ready from channel {} (relayed={}) pid={}",
            incoming.from(),
            incoming.is_relayed(),
            incoming.argument_list().get_int(0)
        );
        let mut args = ArrayValue::new();
        args.push("dark");
        args.push(2.0);
        incoming
            .reply(&ProcessMessage::with_arguments("configure", args))
            .map(|_| ())
            .map_err(|err| HandlerError::new(err.to_string()))
    });

    // Sub side: reports `configure` back to this thread.
    let (done_tx, done_rx) = mpsc::channel();
    let sub_dispatcher = MessageDispatcher::new(ProcessRole::Sub);
    sub_dispatcher.on("configure", ListenerScope::Sub, move |incoming: &IncomingMessage| {
        let args = incoming.argument_list();
        done_tx
            .send((args.get_string(0).to_string(), args.get_double(1)))
            .map_err(|_| HandlerError::new("example finished"))
    });

    let config = ChannelConfig::default();
    let main_registry = Arc::new(ChannelRegistry::new());
    let main_channel = Channel::connect(
        &endpoint,
        MAIN_ID,
        &main_registry,
        config.clone(),
        Some(Arc::new(main_dispatcher)),
    )?;
    let sub_registry = Arc::new(ChannelRegistry::new());
    let sub_channel = Channel::connect(
        &endpoint,
        SUB_ID,
        &sub_registry,
        config,
        Some(Arc::new(sub_dispatcher)),
    )?;

    let mut args = ArrayValue::new();
    args.push(i32::try_from(std::process::id()).unwrap_or(0));
    let messenger = ProcessMessenger::new(sub_channel.clone(), ProcessRole::Sub);
    messenger.send_process_message_to(
        MAIN_ID,
        ProcessRole::Main,
        &ProcessMessage::with_arguments("ready", args),
    )?;

    let (theme, scale) = done_rx.recv_timeout(Duration::from_secs(5))?;
    eprintln!("[sub] configured: theme={theme} scale={scale}");

    sub_channel.close();
    main_channel.close();
    hub_registry.close_all();
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
