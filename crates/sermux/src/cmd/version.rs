use serde::Serialize;
use sermux_frame::{HEADER_SIZE, MAX_PAYLOAD};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    frame_header_bytes: usize,
    max_payload_bytes: usize,
}

impl VersionOutput {
    fn collect() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("SERMUX_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("SERMUX_BUILD_PROFILE").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            frame_header_bytes: HEADER_SIZE,
            max_payload_bytes: MAX_PAYLOAD,
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("sermux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let out = VersionOutput::collect();
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("name: {}", out.name);
            println!("version: {}", out.version);
            println!("target: {}", out.target);
            println!("profile: {}", out.profile);
            println!("target_os: {}", out.target_os);
            println!("target_arch: {}", out.target_arch);
            println!(
                "frame: {}-byte header, payload up to {} bytes",
                out.frame_header_bytes, out.max_payload_bytes
            );
        }
    }

    Ok(SUCCESS)
}
