mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "procmux", version, about = "Multiplexed process messaging CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). PROCMUX_LOG overrides this with a filter directive.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "procmux",
            "send",
            "/tmp/test.sock",
            "--id",
            "1",
            "--name",
            "hello",
            "--args",
            "[1, \"two\"]",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.id, 1);
                assert_eq!(args.name, "hello");
                assert!(args.to.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_requires_a_name() {
        let err = Cli::try_parse_from(["procmux", "send", "/tmp/test.sock", "--id", "1"])
            .expect_err("missing --name should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_listen_with_role_and_count() {
        let cli = Cli::try_parse_from([
            "procmux",
            "listen",
            "tcp:127.0.0.1:7000",
            "--id",
            "2",
            "--role",
            "main",
            "--count",
            "3",
        ])
        .expect("listen args should parse");
        assert!(matches!(cli.command, Command::Listen(_)));
    }

    #[test]
    fn parses_hub_subcommand() {
        let cli = Cli::try_parse_from(["procmux", "--format", "json", "hub", "/tmp/hub.sock"])
            .expect("hub args should parse");
        assert!(matches!(cli.command, Command::Hub(_)));
    }
}
