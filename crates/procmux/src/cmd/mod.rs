use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use procmux_channel::ReceivedFrame;
use procmux_message::{decode_envelope, ProcessRole};
use procmux_transport::Endpoint;
use tracing::{debug, warn};

use crate::exit::{transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::{print_message, OutputFormat};

pub mod hub;
pub mod listen;
pub mod send;
pub mod version;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a hub that relays between connected channels.
    Hub(HubArgs),
    /// Send a single process message.
    Send(SendArgs),
    /// Connect as a channel and print received process messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Hub(args) => hub::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Process role as given on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Main,
    Sub,
}

impl From<RoleArg> for ProcessRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Main => ProcessRole::Main,
            RoleArg::Sub => ProcessRole::Sub,
        }
    }
}

#[derive(Args, Debug)]
pub struct HubArgs {
    /// Endpoint to bind: a socket path, unix:<path> or tcp:<host>:<port>.
    #[arg(env = "PROCMUX_ENDPOINT")]
    pub endpoint: String,
    /// Exit after printing N process messages addressed to the hub.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Hub endpoint to connect to.
    #[arg(env = "PROCMUX_ENDPOINT")]
    pub endpoint: String,
    /// Channel id to announce.
    #[arg(long, env = "PROCMUX_CHANNEL_ID")]
    pub id: i64,
    /// Process message name.
    #[arg(long)]
    pub name: String,
    /// Arguments as a JSON array.
    #[arg(long, value_name = "JSON")]
    pub args: Option<String>,
    /// Relay to this channel id instead of messaging the hub.
    #[arg(long, value_name = "ID")]
    pub to: Option<i64>,
    /// Role the message is addressed to.
    #[arg(long, value_enum, default_value = "main")]
    pub target: RoleArg,
    /// Role of this process.
    #[arg(long, value_enum, default_value = "sub")]
    pub role: RoleArg,
    /// Handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Hub endpoint to connect to.
    #[arg(env = "PROCMUX_ENDPOINT")]
    pub endpoint: String,
    /// Channel id to announce.
    #[arg(long, env = "PROCMUX_CHANNEL_ID")]
    pub id: i64,
    /// Role of this process; only messages addressed to it are printed.
    #[arg(long, value_enum, default_value = "sub")]
    pub role: RoleArg,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_endpoint(input: &str) -> CliResult<Endpoint> {
    input
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Print process messages for `local_role` from `rx` until stopped.
///
/// Stops on Ctrl-C, once `count` messages were printed, or when `alive`
/// reports the source gone and the queue is idle. Returns how many were printed.
pub(crate) fn drain_messages(
    rx: &Receiver<ReceivedFrame>,
    local_role: ProcessRole,
    format: OutputFormat,
    count: Option<usize>,
    running: &AtomicBool,
    alive: &dyn Fn() -> bool,
) -> usize {
    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if count.is_some_and(|count| printed >= count) {
            break;
        }

        let frame = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                if !alive() {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let envelope = match decode_envelope(&frame.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(from = frame.from, error = %err, "ignoring payload that is not a process message");
                continue;
            }
        };
        if envelope.target != local_role {
            debug!(
                name = envelope.message.name(),
                target = envelope.target.as_str(),
                "process message for another role; skipping"
            );
            continue;
        }

        print_message(&envelope, &frame, format);
        printed = printed.saturating_add(1);
    }
    printed
}
