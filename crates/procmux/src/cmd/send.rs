use std::sync::Arc;

use procmux_channel::{Channel, ChannelConfig, ChannelRegistry};
use procmux_message::{ProcessMessage, ProcessMessenger, ProcessRole};
use procmux_value::Value;
use tracing::debug;

use crate::cmd::{parse_duration, parse_endpoint, SendArgs};
use crate::exit::{channel_error, message_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::OutputFormat;

pub fn run(args: SendArgs, _format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let connect_timeout = parse_duration(&args.timeout)?;
    let local_role = ProcessRole::from(args.role);
    let target = ProcessRole::from(args.target);
    if local_role == target {
        return Err(CliError::new(
            USAGE,
            format!("--target must differ from --role (both are {local_role})"),
        ));
    }
    let message = build_message(&args.name, args.args.as_deref())?;

    let registry = Arc::new(ChannelRegistry::new());
    let config = ChannelConfig {
        connect_timeout,
        ..ChannelConfig::default()
    };
    let channel = Channel::connect(&endpoint, args.id, &registry, config, None)
        .map_err(|err| channel_error("connect failed", err))?;

    let messenger = ProcessMessenger::new(channel.clone(), local_role);
    let result = match args.to {
        Some(to) => messenger.send_process_message_to(to, target, &message),
        None => messenger.send_process_message(target, &message),
    };
    channel.close();

    if !result.map_err(|err| message_error("send failed", err))? {
        return Err(CliError::new(
            FAILURE,
            "send failed: channel disconnected before the message was written",
        ));
    }
    debug!(name = message.name(), to = ?args.to, "process message sent");
    Ok(SUCCESS)
}

fn build_message(name: &str, raw_args: Option<&str>) -> CliResult<ProcessMessage> {
    let Some(raw) = raw_args else {
        return Ok(ProcessMessage::new(name));
    };

    let json: serde_json::Value = serde_json::from_str(raw)
        .map_err(|err| CliError::new(USAGE, format!("--args is not valid JSON: {err}")))?;
    match Value::from_json(&json) {
        Value::Array(arguments) => Ok(ProcessMessage::with_arguments(name, arguments)),
        other => Err(CliError::new(
            USAGE,
            format!("--args must be a JSON array, got {}", other.value_type()),
        )),
    }
}
