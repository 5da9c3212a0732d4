use std::path::PathBuf;

/// Errors that can occur while acquiring or configuring a port.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to put the device into raw mode.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to allocate a pseudo-terminal.
    #[error("failed to allocate pseudo-terminal: {0}")]
    PtyAllocate(std::io::Error),

    /// Failed to create the alias symlink for a pseudo-terminal.
    #[error("failed to create alias {path}: {source}")]
    Alias {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on an open port.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
