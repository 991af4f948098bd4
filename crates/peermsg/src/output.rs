use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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

/// One message observed by a command, with the peer it came from if known.
#[derive(Debug, Clone)]
pub struct Observed {
    pub index: usize,
    pub peer: Option<String>,
    pub payload: Bytes,
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    index: usize,
    size: usize,
    payload: String,
    payload_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer_id: Option<&'a str>,
    timestamp: String,
}

pub fn print_messages(messages: &[Observed], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let timestamp = now_unix_seconds();
            for message in messages {
                let out = MessageOutput {
                    index: message.index,
                    size: message.payload.len(),
                    payload: payload_preview(&message.payload),
                    payload_hex: hex::encode(&message.payload),
                    peer_id: message.peer.as_deref(),
                    timestamp: timestamp.clone(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "PEER", "PAYLOAD"]);
            for message in messages {
                table.add_row(vec![
                    message.index.to_string(),
                    message.payload.len().to_string(),
                    message.peer.clone().unwrap_or_else(|| "-".to_string()),
                    payload_preview(&message.payload),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for message in messages {
                println!(
                    "#{} size={} peer={} payload={}",
                    message.index,
                    message.payload.len(),
                    message.peer.as_deref().unwrap_or("-"),
                    payload_preview(&message.payload)
                );
            }
        }
        OutputFormat::Raw => {
            for message in messages {
                print_raw(&message.payload);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
