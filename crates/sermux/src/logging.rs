use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Shape of the diagnostic lines on stderr: serial port setup, channel
/// connect/disconnect, dropped frames and line errors.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// One human-readable line per event, with the thread name.
    Text,
    /// One JSON object per event, for log collectors.
    Json,
}

/// Lowest level shown. `warn` covers unroutable and oversized frames and
/// failing endpoints; `debug` adds per-direction start/stop and repeated
/// line errors; `trace` logs every frame in both directions.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Log to stderr so stdout stays free for the channel table and reports.
/// Thread names are included to tell the ingress and egress loops apart.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
