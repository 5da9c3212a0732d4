/// Errors that can occur during frame encoding, decoding and I/O.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The line accepted only part of a frame. The rest is not retried.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stop flag was raised while waiting for bytes.
    #[error("frame read cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FrameError>;
