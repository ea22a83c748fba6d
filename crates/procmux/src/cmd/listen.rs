use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use procmux_channel::{Channel, ChannelConfig, ChannelRegistry, QueueHandler};
use tracing::info;

use crate::cmd::{drain_messages, install_ctrlc_handler, parse_duration, parse_endpoint, ListenArgs};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let connect_timeout = parse_duration(&args.timeout)?;
    let registry = Arc::new(ChannelRegistry::new());
    let (queue, rx) = QueueHandler::new();

    let config = ChannelConfig {
        connect_timeout,
        ..ChannelConfig::default()
    };
    let channel = Channel::connect(&endpoint, args.id, &registry, config, Some(Arc::new(queue)))
        .map_err(|err| channel_error("connect failed", err))?;
    info!(channel_id = args.id, role = ?args.role, %endpoint, "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let alive = || !channel.is_closed();
    let printed = drain_messages(&rx, args.role.into(), format, args.count, &running, &alive);
    let hub_gone = channel.is_closed();
    channel.close();

    let satisfied = args.count.is_some_and(|count| printed >= count);
    if hub_gone && !satisfied {
        return Err(CliError::new(FAILURE, "hub closed the channel"));
    }
    Ok(SUCCESS)
}
