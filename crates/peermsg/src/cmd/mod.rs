use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use peermsg_frame::DEFAULT_MAX_PAYLOAD;
use peermsg_handler::DEFAULT_PROTOCOL;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write messages as length-prefixed frames.
    Encode(EncodeArgs),
    /// Read length-prefixed frames and print each message.
    Decode(DecodeArgs),
    /// Send messages between two in-memory peers and print what arrives.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// String message (repeatable).
    #[arg(long, short = 'd')]
    pub data: Vec<String>,
    /// Hex-encoded message (repeatable). Written after all --data messages.
    #[arg(long, short = 'x')]
    pub hex: Vec<String>,
    /// Write frames to a file instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File to read. Default: stdin.
    pub path: Option<PathBuf>,
    /// Largest accepted message in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_size: usize,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Message to send (repeatable). Default: "hello".
    #[arg(long, short = 'd')]
    pub data: Vec<String>,
    /// Send the message list this many times.
    #[arg(long, default_value = "1")]
    pub count: usize,
    /// Protocol identifier to negotiate.
    #[arg(long, default_value = DEFAULT_PROTOCOL)]
    pub protocol: String,
    /// Maximum time to wait for each message (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
