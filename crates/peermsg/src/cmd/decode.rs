use std::fs::File;
use std::io::{BufReader, Read};

use peermsg_frame::{FrameConfig, FrameError, FrameReader};
use tracing::debug;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_messages, Observed, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = FrameConfig {
        max_payload_size: args.max_size,
    };

    let (messages, failure) = match &args.path {
        Some(path) => {
            let file = File::open(path).map_err(|err| {
                io_error(&format!("failed reading {}", path.display()), err)
            })?;
            read_all(FrameReader::with_config(BufReader::new(file), config))
        }
        None => read_all(FrameReader::with_config(std::io::stdin().lock(), config)),
    };

    // Complete messages are printed even when the input ends mid-frame.
    print_messages(&messages, format);
    debug!(count = messages.len(), "decoded messages");

    match failure {
        Some(err) => Err(frame_error("decode failed", err)),
        None => Ok(SUCCESS),
    }
}

fn read_all<R: Read>(mut reader: FrameReader<R>) -> (Vec<Observed>, Option<FrameError>) {
    let mut observed = Vec::new();
    for (index, next) in reader.messages().enumerate() {
        match next {
            Ok(payload) => observed.push(Observed {
                index,
                peer: None,
                payload,
            }),
            Err(err) => return (observed, Some(err)),
        }
    }
    (observed, None)
}
