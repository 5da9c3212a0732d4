//! Channel-tagged framing for a shared serial line.
//!
//! Every chunk of channel data crosses the line as one frame:
//! - a 1-byte channel ID (0-255)
//! - a 2-byte big-endian payload length
//! - the payload itself
//!
//! There is no magic number, checksum or trailer. If a byte is lost the
//! reader cannot detect it and will misparse until the stream happens to
//! realign on a frame boundary.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, encode_header, Frame, FrameConfig, FrameHeader,
    HEADER_SIZE, MAX_CHANNEL_ID, MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
