use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: channel (1) + length (2) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Maximum payload bytes carried by one frame.
pub const MAX_PAYLOAD: usize = 1000;

/// Highest channel ID representable on the wire.
pub const MAX_CHANNEL_ID: u8 = u8::MAX;

/// A framed chunk of channel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this chunk belongs to.
    pub channel: u8,
    /// The chunk itself.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Decoded header fields of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: u8,
    /// Declared payload length. Not validated against any buffer.
    pub len: u16,
}

/// Encode a header for a payload of `len` bytes on `channel`.
pub fn encode_header(channel: u8, len: u16) -> [u8; HEADER_SIZE] {
    let [hi, lo] = len.to_be_bytes();
    [channel, hi, lo]
}

/// Interpret the first three bytes of a frame.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> FrameHeader {
    FrameHeader {
        channel: bytes[0],
        len: u16::from_be_bytes([bytes[1], bytes[2]]),
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬───────────┬──────────────────┐
/// │ Channel    │ Length    │ Payload          │
/// │ (1B)       │ (2B BE)   │ (Length bytes)   │
/// └────────────┴───────────┴──────────────────┘
/// ```
pub fn encode_frame(channel: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(channel);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = decode_header(&[src[0], src[1], src[2]]);
    let payload_len = usize::from(header.len);

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        channel: header.channel,
        payload,
    }))
}

/// Configuration shared by frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: [`MAX_PAYLOAD`].
    pub max_payload_size: usize,
    /// How long to sleep when the port has nothing to offer.
    pub poll_interval: std::time::Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            poll_interval: std::time::Duration::from_millis(1),
        }
    }
}
