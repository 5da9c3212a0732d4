use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sermux_transport::{is_idle, Port};

use crate::codec::{decode_header, FrameConfig, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};

const DISCARD_CHUNK_SIZE: usize = 256;

/// Pulls frames off a non-blocking [`Port`].
///
/// Reads are polled: when the port has nothing to offer the reader sleeps
/// for one poll interval and tries again, checking the stop flag (if one
/// is attached) before every attempt. Header bytes and the unread part of
/// the current payload are tracked across calls, so an I/O error or a
/// cancelled wait never loses stream position on its own.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
    stop: Option<Arc<AtomicBool>>,
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    remaining: usize,
}

impl<T: Port> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            stop: None,
            header: [0; HEADER_SIZE],
            header_filled: 0,
            remaining: 0,
        }
    }

    /// Abort waits with [`FrameError::Cancelled`] once `stop` is set.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Read the next frame header.
    ///
    /// Any payload left over from the previous frame is drained first so
    /// the header is always parsed at a frame boundary. A declared length
    /// above the configured maximum is reported as
    /// [`FrameError::PayloadTooLarge`]; the payload stays pending and is
    /// drained by [`discard_payload`](Self::discard_payload) or the next
    /// call to this method.
    pub fn read_header(&mut self) -> Result<FrameHeader> {
        if self.remaining > 0 {
            self.discard_payload()?;
        }

        while self.header_filled < HEADER_SIZE {
            let n = read_some(
                &self.inner,
                self.stop.as_deref(),
                self.config.poll_interval,
                &mut self.header[self.header_filled..],
            )?;
            self.header_filled += n;
        }

        let header = decode_header(&self.header);
        self.header_filled = 0;
        self.remaining = usize::from(header.len);

        if self.remaining > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: self.remaining,
                max: self.config.max_payload_size,
            });
        }
        Ok(header)
    }

    /// Read the next chunk of the current frame's payload.
    ///
    /// Waits until at least one byte is available. Returns `Ok(0)` once
    /// the whole payload has been read.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = self.remaining.min(buf.len());
        if want == 0 {
            return Ok(0);
        }
        let n = read_some(
            &self.inner,
            self.stop.as_deref(),
            self.config.poll_interval,
            &mut buf[..want],
        )?;
        self.remaining -= n;
        Ok(n)
    }

    /// Consume and drop the rest of the current frame's payload.
    ///
    /// Returns how many bytes were dropped by this call.
    pub fn discard_payload(&mut self) -> Result<usize> {
        let mut scratch = [0u8; DISCARD_CHUNK_SIZE];
        let mut dropped = 0usize;
        while self.remaining > 0 {
            let n = self.read_payload(&mut scratch)?;
            dropped += n;
        }
        Ok(dropped)
    }

    /// Payload bytes of the current frame not yet read.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Borrow the underlying port.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner port.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn read_some<T: Port + ?Sized>(
    inner: &T,
    stop: Option<&AtomicBool>,
    poll_interval: Duration,
    buf: &mut [u8],
) -> Result<usize> {
    loop {
        if stop.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            return Err(FrameError::Cancelled);
        }
        match inner.read_bytes(buf) {
            Ok(0) => {}
            Ok(n) => return Ok(n),
            Err(err) if is_idle(&err) => {}
            Err(err) => return Err(FrameError::Io(err)),
        }
        std::thread::sleep(poll_interval);
    }
}
