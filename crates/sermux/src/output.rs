use std::io::IsTerminal;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use sermux_mux::{ChannelRegistry, DirectionStats, EngineReport};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Debug, Serialize)]
struct ChannelOutput {
    channel: u8,
    pty: String,
    link: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConnectedOutput {
    event: &'static str,
    serial_port: String,
    channels: Vec<ChannelOutput>,
    timestamp: String,
}

/// Announce the channel to pseudo-terminal bindings once the engine is set up.
pub fn print_channels(serial_port: &Path, registry: &ChannelRegistry, format: OutputFormat) {
    let channels: Vec<ChannelOutput> = registry
        .iter()
        .map(|endpoint| ChannelOutput {
            channel: endpoint.channel(),
            pty: endpoint.name().to_string(),
            link: endpoint.alias().map(|p| p.display().to_string()),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let out = ConnectedOutput {
                event: "connected",
                serial_port: serial_port.display().to_string(),
                channels,
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
                .set_header(vec!["CHANNEL", "PTY", "LINK"]);
            for ch in &channels {
                table.add_row(vec![
                    ch.channel.to_string(),
                    ch.pty.clone(),
                    ch.link.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("serial port: {}", serial_port.display());
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Physical port has been opened; {}", serial_port.display());
            for ch in &channels {
                println!(
                    "Connected {:>3} : {} ({})",
                    ch.channel,
                    ch.pty,
                    ch.link.as_deref().unwrap_or("-")
                );
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportOutput<'a> {
    event: &'static str,
    #[serde(flatten)]
    report: &'a EngineReport,
    timestamp: String,
}

/// Print per-direction counters after the engine has stopped.
pub fn print_report(report: &EngineReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReportOutput {
                event: "stopped",
                report,
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
                .set_header(vec![
                    "DIRECTION",
                    "FRAMES",
                    "BYTES",
                    "UNROUTABLE",
                    "OVERSIZED",
                    "SHORT WRITES",
                    "ENDPOINT ERRORS",
                    "LINE ERRORS",
                ]);
            for (direction, stats) in [("ingress", &report.ingress), ("egress", &report.egress)] {
                table.add_row(stats_row(direction, stats));
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (direction, stats) in [("ingress", &report.ingress), ("egress", &report.egress)] {
                println!(
                    "{direction}: {} frames, {} bytes, {} unroutable, {} oversized, \
                     {} short writes, {} endpoint errors, {} line errors",
                    stats.frames,
                    stats.bytes,
                    stats.unroutable,
                    stats.oversized,
                    stats.short_writes,
                    stats.endpoint_errors,
                    stats.transport_errors
                );
            }
        }
    }
}

fn stats_row(direction: &str, stats: &DirectionStats) -> Vec<String> {
    vec![
        direction.to_string(),
        stats.frames.to_string(),
        stats.bytes.to_string(),
        stats.unroutable.to_string(),
        stats.oversized.to_string(),
        stats.short_writes.to_string(),
        stats.endpoint_errors.to_string(),
        stats.transport_errors.to_string(),
    ]
}

#[derive(Debug, Serialize)]
pub struct ExchangeOutput<'a> {
    pub instance: &'a str,
    pub seq: u64,
    /// `None` when nothing arrived before the response timeout.
    pub response: Option<String>,
    pub timestamp: String,
}

/// Print one probe write/response exchange.
pub fn print_exchange(exchange: &ExchangeOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(exchange).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "{} {} : {}",
                exchange.timestamp,
                exchange.instance,
                exchange.response.as_deref().unwrap_or("<no response>")
            );
        }
    }
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

pub fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
