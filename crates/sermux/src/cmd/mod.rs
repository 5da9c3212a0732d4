use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod probe;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Multiplex channels over a serial port, one pseudo-terminal per channel.
    Run(RunArgs),
    /// Repeatedly write a name to a port and print each response.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// One `-c ID[:LINK]` argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: u8,
    pub link: Option<PathBuf>,
}

impl std::str::FromStr for ChannelSpec {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (id, link) = match input.split_once(':') {
            Some((id, link)) => (id, Some(link)),
            None => (input, None),
        };

        let id = id
            .trim()
            .parse::<u8>()
            .map_err(|_| format!("channel id must be 0-255, got '{id}'"))?;
        let link = match link {
            Some("") => return Err("link path after ':' must not be empty".to_string()),
            Some(link) => Some(PathBuf::from(link)),
            None => None,
        };
        Ok(Self { id, link })
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Channel to expose, as ID or ID:LINK (repeatable). LINK becomes a
    /// symlink to the channel's pseudo-terminal.
    #[arg(long = "channel", short = 'c', value_name = "ID[:LINK]", required = true)]
    pub channels: Vec<ChannelSpec>,
    /// Serial device carrying the multiplexed stream.
    pub serial_port: PathBuf,
    /// Sleep between polls when nothing is pending (e.g. 1ms, 5ms).
    #[arg(long, default_value = "1ms")]
    pub poll_interval: String,
    /// Stop after this many consecutive read errors on the serial port.
    /// Default: keep retrying.
    #[arg(long, value_name = "N")]
    pub max_transport_errors: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Name written to the port on every exchange.
    pub instance_name: String,
    /// Port to probe (usually a channel link created by `sermux run`).
    pub serial_port: PathBuf,
    /// Stop after N exchanges. Default: run until Ctrl-C.
    #[arg(long, short = 'c', value_name = "N")]
    pub count: Option<u64>,
    /// Pause between exchanges (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// How long to wait for a response after each write.
    #[arg(long, default_value = "100ms")]
    pub response_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `250ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
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
