use std::fs::File;
use std::io::{ErrorKind, Read, Write};

/// A bidirectional byte stream the engine can read from and write to.
///
/// Methods take `&self` so one handle can be read by one thread while
/// another thread writes to it. Implementations are expected to be
/// non-blocking or short-timeout: "nothing available" is reported as
/// `Ok(0)` or an error for which [`is_idle`] returns true, never by
/// blocking indefinitely.
pub trait Port: Send + Sync {
    /// Read up to `buf.len()` bytes.
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write up to `buf.len()` bytes, returning how many were accepted.
    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize>;
}

/// Returns true if the error only means "try again later".
pub fn is_idle(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

impl Port for File {
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut file = self;
        Read::read(&mut file, buf)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self;
        Write::write(&mut file, buf)
    }
}

#[cfg(unix)]
impl Port for std::os::unix::net::UnixStream {
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut stream = self;
        Read::read(&mut stream, buf)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut stream = self;
        Write::write(&mut stream, buf)
    }
}

impl<P: Port + ?Sized> Port for &P {
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read_bytes(buf)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).write_bytes(buf)
    }
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read_bytes(buf)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).write_bytes(buf)
    }
}
