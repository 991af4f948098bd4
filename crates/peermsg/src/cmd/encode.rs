use std::fs::File;
use std::io::{BufWriter, Write};

use peermsg_frame::FrameWriter;
use tracing::debug;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let messages = resolve_messages(&args)?;

    match &args.out {
        Some(path) => {
            let file = File::create(path).map_err(|err| {
                io_error(&format!("failed creating {}", path.display()), err)
            })?;
            write_frames(BufWriter::new(file), &messages)?;
        }
        None => write_frames(std::io::stdout().lock(), &messages)?,
    }

    debug!(count = messages.len(), "encoded messages");
    Ok(SUCCESS)
}

fn resolve_messages(args: &EncodeArgs) -> CliResult<Vec<Vec<u8>>> {
    let mut messages: Vec<Vec<u8>> = args.data.iter().map(|d| d.as_bytes().to_vec()).collect();
    for encoded in &args.hex {
        let message = hex::decode(encoded.trim())
            .map_err(|err| CliError::new(USAGE, format!("--hex {encoded:?} is not valid hex: {err}")))?;
        messages.push(message);
    }
    if messages.is_empty() {
        return Err(CliError::new(USAGE, "no messages given (use --data or --hex)"));
    }
    Ok(messages)
}

fn write_frames<W: Write>(sink: W, messages: &[Vec<u8>]) -> CliResult<()> {
    let mut writer = FrameWriter::new(sink);
    for message in messages {
        writer
            .write_message(message)
            .map_err(|err| frame_error("encode failed", err))?;
    }
    Ok(())
}
