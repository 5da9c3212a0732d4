use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Port;

/// The physical serial line shared by all channels.
///
/// Opened read/write, without becoming the controlling terminal, with
/// synchronous writes and non-blocking reads. Any bytes queued in either
/// direction at open time are discarded and the line is switched to raw
/// mode, so the engine sees exactly the bytes the peer sent.
pub struct SerialPort {
    file: File,
    path: PathBuf,
}

impl SerialPort {
    /// Open and configure the serial device at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_SYNC | libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        let fd = file.as_raw_fd();

        // SAFETY: `fd` is an open descriptor owned by `file` for the duration of the call.
        if unsafe { libc::tcflush(fd, libc::TCIOFLUSH) } != 0 {
            debug!(?path, error = %std::io::Error::last_os_error(), "tcflush failed");
        }

        configure_raw(fd).map_err(|source| TransportError::Configure {
            path: path.clone(),
            source,
        })?;

        info!(?path, "opened serial port");
        Ok(Self { file, path })
    }

    /// The device path this port was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for SerialPort {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Port for SerialPort {
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read_bytes(buf)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write_bytes(buf)
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("path", &self.path)
            .finish()
    }
}

/// Put the terminal behind `fd` into raw mode.
///
/// No line discipline, no output post-processing, no hardware flow
/// control, receiver enabled, modem control lines ignored, 8-bit
/// characters, and reads that return immediately with whatever is
/// available (`VMIN = 0`, `VTIME = 0`).
pub fn configure_raw(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: termios is a plain C struct; all-zero is a valid bit pattern and
    // it is fully overwritten by tcgetattr before use.
    let mut info: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `info` is a valid writable termios and `fd` is caller-owned.
    if unsafe { libc::tcgetattr(fd, &mut info) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `info` was initialized by tcgetattr above.
    unsafe { libc::cfmakeraw(&mut info) };
    info.c_cflag &= !libc::CRTSCTS;
    info.c_cflag |= libc::CLOCAL | libc::CREAD;
    info.c_cflag &= !libc::CSIZE;
    info.c_cflag |= libc::CS8;
    info.c_oflag &= !libc::OPOST;
    info.c_cc[libc::VTIME] = 0;
    info.c_cc[libc::VMIN] = 0;

    // SAFETY: `info` is a valid termios and `fd` is caller-owned.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &info) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
