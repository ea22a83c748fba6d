use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use procmux_channel::{ChannelListener, ChannelRegistry, QueueHandler};
use procmux_message::ProcessRole;
use tracing::{debug, info, warn};

use crate::cmd::{drain_messages, install_ctrlc_handler, parse_endpoint, HubArgs};
use crate::exit::{channel_error, io_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: HubArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let registry = Arc::new(ChannelRegistry::new());
    let (queue, rx) = QueueHandler::new();

    let listener = ChannelListener::bind(&endpoint, Arc::clone(&registry))
        .map_err(|err| channel_error("bind failed", err))?
        .with_handler(Arc::new(queue));
    let bound = listener.local_endpoint();
    info!(endpoint = %bound, "hub ready");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (accept_err_tx, accept_err_rx) = mpsc::channel();
    let accept_running = Arc::clone(&running);
    let acceptor = thread::Builder::new()
        .name("procmux-hub-accept".to_string())
        .spawn(move || {
            while accept_running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok(channel) => debug!(accepted = listener.accepted(), ?channel, "channel accepted"),
                    Err(err) => {
                        warn!(error = %err, "accept failed; stopping hub");
                        let _ = accept_err_tx.send(err);
                        accept_running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        })
        .map_err(|err| io_error("failed to start accept thread", err))?;

    let printed = drain_messages(&rx, ProcessRole::Main, format, args.count, &running, &|| true);
    info!(printed, channels = registry.len(), "hub shutting down");

    running.store(false, Ordering::SeqCst);
    registry.close_all();
    if !acceptor.is_finished() {
        // Unblock the pending accept so the listener drops and removes its socket file.
        if let Ok(stream) = procmux_transport::connect(&bound) {
            let _ = stream.shutdown();
        }
    }
    let _ = acceptor.join();

    if let Ok(err) = accept_err_rx.try_recv() {
        return Err(channel_error("accept failed", err));
    }
    Ok(SUCCESS)
}
