use std::io::ErrorKind;

use bytes::BytesMut;
use sermux_transport::Port;

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// Writes complete frames to a [`Port`].
///
/// Each frame goes out as a single write of header and payload together.
/// If the port takes fewer bytes than that, the frame is reported as a
/// [`FrameError::ShortWrite`] and the remainder is dropped: there is no
/// byte-level retry.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Port> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD),
            config,
        }
    }

    /// Write a complete frame.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.channel, frame.payload.as_ref())
    }

    /// Encode and send a payload on a channel.
    pub fn send(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(channel, payload, &mut self.buf)?;

        let expected = self.buf.len();
        loop {
            match self.inner.write_bytes(&self.buf) {
                Ok(written) if written == expected => return Ok(()),
                Ok(written) => return Err(FrameError::ShortWrite { written, expected }),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Err(FrameError::ShortWrite {
                        written: 0,
                        expected,
                    })
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying port.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner port.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
