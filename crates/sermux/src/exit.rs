use std::fmt;
use std::io;

use sermux_mux::MuxError;
use sermux_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let denied = match &err {
        TransportError::Open { source, .. }
        | TransportError::Configure { source, .. }
        | TransportError::Alias { source, .. }
        | TransportError::PtyAllocate(source) => {
            source.kind() == io::ErrorKind::PermissionDenied
        }
        TransportError::Io(_) => false,
    };
    match err {
        TransportError::Io(source) => io_error(context, source),
        other if denied => CliError::new(PERMISSION_DENIED, format!("{context}: {other}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::DuplicateChannel(_) | MuxError::NoChannels | MuxError::InvalidConfig(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        MuxError::Transport(err) => transport_error(context, err),
        MuxError::Frame(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        MuxError::Spawn { .. } | MuxError::DirectionPanicked(_) => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}
