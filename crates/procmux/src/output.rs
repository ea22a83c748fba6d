use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use procmux_channel::ReceivedFrame;
use procmux_frame::FrameType;
use procmux_message::Envelope;
use procmux_value::Value;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    name: &'a str,
    source: &'a str,
    target: &'a str,
    from: i64,
    to: i64,
    relayed: bool,
    channel_id: Option<i64>,
    arguments: serde_json::Value,
    payload_size: usize,
    timestamp: String,
}

/// Print a decoded process message together with the frame that carried it.
pub fn print_message(envelope: &Envelope, frame: &ReceivedFrame, format: OutputFormat) {
    let arguments = Value::Array(envelope.message.argument_list().clone()).to_json();
    let relayed = frame.frame_type == FrameType::Relay;

    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                name: envelope.message.name(),
                source: envelope.source.as_str(),
                target: envelope.target.as_str(),
                from: frame.from,
                to: frame.to,
                relayed,
                channel_id: frame.channel_id,
                arguments,
                payload_size: frame.payload.len(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "SOURCE", "FROM", "VIA", "ARGUMENTS"])
                .add_row(vec![
                    envelope.message.name().to_string(),
                    envelope.source.as_str().to_string(),
                    frame.from.to_string(),
                    via(relayed).to_string(),
                    arguments.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "name={} source={} from={} via={} args={}",
                envelope.message.name(),
                envelope.source,
                frame.from,
                via(relayed),
                arguments
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.payload.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn via(relayed: bool) -> &'static str {
    if relayed {
        "relay"
    } else {
        "direct"
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
