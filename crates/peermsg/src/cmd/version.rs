use peermsg_frame::{DEFAULT_MAX_PAYLOAD, MAX_LENGTH_PREFIX_BYTES};
use peermsg_handler::DEFAULT_PROTOCOL;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("peermsg {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: peermsg");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PEERMSG_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_protocol: {DEFAULT_PROTOCOL}");
    println!("max_message_size: {DEFAULT_MAX_PAYLOAD}");
    println!("max_length_prefix_bytes: {MAX_LENGTH_PREFIX_BYTES}");
    println!(
        "features: handler={}, cli=true",
        cfg!(feature = "handler")
    );

    Ok(SUCCESS)
}
