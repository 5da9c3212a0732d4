/// Errors that can occur while setting up or running the engine.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// A channel ID was registered twice.
    #[error("channel {0} is already registered")]
    DuplicateChannel(u8),

    /// The engine was asked to run without any channel.
    #[error("no channels specified")]
    NoChannels,

    /// Engine configuration is out of range.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sermux_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sermux_frame::FrameError),

    /// A direction thread could not be started.
    #[error("failed to start {direction} thread: {source}")]
    Spawn {
        direction: &'static str,
        source: std::io::Error,
    },

    /// A direction thread panicked.
    #[error("{0} thread panicked")]
    DirectionPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, MuxError>;
